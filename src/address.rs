//! Endpoint and memory addressing.
//!
//! This module defines the three address shapes the protocol works with:
//!
//! - [`NodeAddress`] - a logical FINS endpoint (network/node/unit triple)
//! - [`Endpoint`] - a full device address: a `NodeAddress` plus the TCP
//!   socket address it is reachable at
//! - [`MemoryAddress`] - a location inside a PLC memory area
//!   (area/word/bit), encoded on the wire as 4 big-endian bytes
//!
//! # Example
//!
//! ```
//! use fins_tcp::{Endpoint, MemoryAddress, MemoryArea, NodeAddress};
//!
//! let plc = Endpoint::new("192.168.1.250", 9600, 0, 10, 0).unwrap();
//! assert_eq!(plc.node(), NodeAddress::new(0, 10, 0));
//!
//! let addr = MemoryAddress::word(MemoryArea::DmWord, 100);
//! assert_eq!(addr.to_bytes(), [0x82, 0x00, 0x64, 0x00]);
//! ```

use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};
use crate::memory::MemoryArea;

/// Node address for FINS communication.
///
/// Identifies a logical FINS endpoint by network, node, and unit number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAddress {
    /// Network address (0 = local network).
    pub network: u8,
    /// Node address within the network.
    pub node: u8,
    /// Unit address within the node (0 = CPU unit).
    pub unit: u8,
}

impl NodeAddress {
    /// Creates a new node address.
    ///
    /// # Example
    ///
    /// ```
    /// use fins_tcp::NodeAddress;
    ///
    /// let plc = NodeAddress::new(0, 10, 0);
    /// assert_eq!(plc.node, 10);
    /// ```
    pub fn new(network: u8, node: u8, unit: u8) -> Self {
        Self {
            network,
            node,
            unit,
        }
    }
}

impl Default for NodeAddress {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.network, self.node, self.unit)
    }
}

/// A full FINS device address: logical node plus TCP location.
///
/// `Clone` produces an independent deep copy; endpoints share no state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    node: NodeAddress,
    addr: SocketAddr,
}

impl Endpoint {
    /// Creates an endpoint from a textual IP address and port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `ip` is not a valid IP address.
    ///
    /// # Example
    ///
    /// ```
    /// use fins_tcp::Endpoint;
    ///
    /// let plc = Endpoint::new("192.168.1.250", 9600, 0, 10, 0).unwrap();
    /// assert!(Endpoint::new("not-an-ip", 9600, 0, 10, 0).is_err());
    /// ```
    pub fn new(ip: &str, port: u16, network: u8, node: u8, unit: u8) -> Result<Self> {
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| Error::invalid_argument(format!("invalid IP address: {ip}")))?;
        Ok(Self {
            node: NodeAddress::new(network, node, unit),
            addr: SocketAddr::new(ip, port),
        })
    }

    /// Creates an endpoint from an already resolved socket address.
    ///
    /// Useful when the peer's address comes from the runtime, e.g. a
    /// simulator bound to an ephemeral port.
    pub fn from_socket_addr(addr: SocketAddr, network: u8, node: u8, unit: u8) -> Self {
        Self {
            node: NodeAddress::new(network, node, unit),
            addr,
        }
    }

    /// Returns the logical FINS node address.
    pub fn node(&self) -> NodeAddress {
        self.node
    }

    /// Returns the TCP socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fins://{} (node {})", self.addr, self.node)
    }
}

/// Wire size of an encoded memory address.
pub const MEMORY_ADDRESS_SIZE: usize = 4;

/// A location in PLC memory: area, word address, and bit position.
///
/// Word operations use bit 0; bit operations address one of the sixteen
/// bits of the word. The wire layout is 4 bytes: area code, word address
/// (big-endian), bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAddress {
    /// The memory area being addressed.
    pub area: MemoryArea,
    /// Word address within the area.
    pub word: u16,
    /// Bit position (0-15); 0 for word access.
    pub bit: u8,
}

impl MemoryAddress {
    /// Creates a word address (bit position 0).
    pub fn word(area: MemoryArea, word: u16) -> Self {
        Self { area, word, bit: 0 }
    }

    /// Creates a bit address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `bit` exceeds 15.
    ///
    /// # Example
    ///
    /// ```
    /// use fins_tcp::{MemoryAddress, MemoryArea};
    ///
    /// let addr = MemoryAddress::bit(MemoryArea::DmBit, 10, 2).unwrap();
    /// assert_eq!(addr.bit, 2);
    /// assert!(MemoryAddress::bit(MemoryArea::DmBit, 10, 16).is_err());
    /// ```
    pub fn bit(area: MemoryArea, word: u16, bit: u8) -> Result<Self> {
        if bit > 15 {
            return Err(Error::invalid_argument("bit position must be 0-15"));
        }
        Ok(Self { area, word, bit })
    }

    /// Serializes the address to its 4-byte wire form.
    pub fn to_bytes(self) -> [u8; MEMORY_ADDRESS_SIZE] {
        let word = self.word.to_be_bytes();
        [self.area.code(), word[0], word[1], self.bit]
    }

    /// Parses a memory address from its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if fewer than 4 bytes are given or the area
    /// code is not in the catalog.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MEMORY_ADDRESS_SIZE {
            return Err(Error::codec(format!(
                "memory address too short: expected {} bytes, got {}",
                MEMORY_ADDRESS_SIZE,
                data.len()
            )));
        }
        let area = MemoryArea::from_code(data[0])
            .ok_or_else(|| Error::codec(format!("unknown memory area code 0x{:02X}", data[0])))?;
        Ok(Self {
            area,
            word: u16::from_be_bytes([data[1], data[2]]),
            bit: data[3],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_new() {
        let ep = Endpoint::new("127.0.0.1", 9601, 0, 10, 0).unwrap();
        assert_eq!(ep.socket_addr(), "127.0.0.1:9601".parse().unwrap());
        assert_eq!(ep.node(), NodeAddress::new(0, 10, 0));
    }

    #[test]
    fn test_endpoint_rejects_bad_ip() {
        assert!(matches!(
            Endpoint::new("999.0.0.1", 9600, 0, 1, 0),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_endpoint_clone_is_independent() {
        let ep = Endpoint::new("10.0.0.1", 9600, 1, 2, 3).unwrap();
        let copy = ep.clone();
        assert_eq!(ep, copy);
        drop(ep);
        assert_eq!(copy.node().node, 2);
    }

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new("127.0.0.1", 9600, 0, 2, 0).unwrap();
        assert_eq!(ep.to_string(), "fins://127.0.0.1:9600 (node 0/2/0)");
    }

    #[test]
    fn test_memory_address_word_encoding() {
        let addr = MemoryAddress::word(MemoryArea::DmWord, 0x1234);
        assert_eq!(addr.to_bytes(), [0x82, 0x12, 0x34, 0x00]);
    }

    #[test]
    fn test_memory_address_bit_encoding() {
        let addr = MemoryAddress::bit(MemoryArea::DmBit, 0x1234, 5).unwrap();
        assert_eq!(addr.to_bytes(), [0x02, 0x12, 0x34, 0x05]);
    }

    #[test]
    fn test_memory_address_bit_out_of_range() {
        assert!(MemoryAddress::bit(MemoryArea::DmBit, 0, 16).is_err());
    }

    #[test]
    fn test_memory_address_roundtrip() {
        let addr = MemoryAddress::bit(MemoryArea::WrBit, 700, 11).unwrap();
        let parsed = MemoryAddress::from_bytes(&addr.to_bytes()).unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_memory_address_from_bytes_short() {
        assert!(matches!(
            MemoryAddress::from_bytes(&[0x82, 0x00]),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn test_memory_address_from_bytes_unknown_area() {
        assert!(matches!(
            MemoryAddress::from_bytes(&[0xFF, 0x00, 0x64, 0x00]),
            Err(Error::Codec { .. })
        ));
    }
}
