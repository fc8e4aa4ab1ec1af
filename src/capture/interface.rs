//! Network interface management

use anyhow::{bail, Context, Result};
use pnet::datalink::{self, NetworkInterface as PnetInterface};
use std::net::IpAddr;

/// Represents a network interface
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    /// Interface name (e.g., "eth0")
    pub name: String,

    /// Interface index
    pub index: u32,

    /// MAC address (if available)
    pub mac: Option<[u8; 6]>,

    /// IP addresses assigned to this interface
    pub ips: Vec<IpAddr>,

    /// Whether the interface is up
    pub is_up: bool,

    /// Whether the interface is a loopback
    pub is_loopback: bool,
}

impl NetworkInterface {
    /// Get a network interface by name
    pub fn by_name(name: &str) -> Result<Self> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|i| i.name == name)
            .with_context(|| format!("Interface '{}' not found", name))?;

        Ok(Self::from_pnet(iface))
    }

    /// Get all available network interfaces
    pub fn list_all() -> Vec<Self> {
        datalink::interfaces().into_iter().map(Self::from_pnet).collect()
    }

    /// Check that this interface can be monitored
    pub fn validate_for_capture(&self) -> Result<()> {
        if !self.is_up {
            bail!("Interface '{}' is down", self.name);
        }
        if self.is_loopback {
            bail!("Interface '{}' is a loopback interface", self.name);
        }
        Ok(())
    }

    fn from_pnet(iface: PnetInterface) -> Self {
        let mac = iface.mac.map(|m| m.octets());
        let ips: Vec<IpAddr> = iface.ips.iter().map(|ip| ip.ip()).collect();
        let is_up = iface.is_up();
        let is_loopback = iface.is_loopback();

        Self {
            name: iface.name,
            index: iface.index,
            mac,
            ips,
            is_up,
            is_loopback,
        }
    }
}

/// Print all interfaces to stdout, for the `--list-interfaces` flag
pub fn print_interfaces() {
    println!("Available network interfaces:");
    for iface in NetworkInterface::list_all() {
        let status = if iface.is_up { "up" } else { "down" };
        let kind = if iface.is_loopback { " (loopback)" } else { "" };
        println!("  {} [{}]{}", iface.name, status, kind);
        if let Some(mac) = iface.mac {
            println!(
                "    mac: {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            );
        }
        for ip in &iface.ips {
            println!("    ip: {}", ip);
        }
    }
}
