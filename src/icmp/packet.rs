use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use crate::error::{Error, Result};
use crate::icmp::{Family, Icmpv4Type, Icmpv6Type, MessageType};

const HEADER_LEN: usize = 4;
const ECHO_HEADER_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;

/// The body of an ICMP echo request or reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Echo {
    pub id: u16,
    pub seq: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Echo(Echo),
    /// Any non-echo message body, kept as raw bytes.
    Other(Vec<u8>),
}

/// An ICMPv4 or ICMPv6 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub typ: MessageType,
    pub code: u8,
    /// Set by [`Message::parse`]. Ignored by [`Message::marshal`], which
    /// computes it for ICMPv4 and leaves it to the kernel for ICMPv6.
    pub checksum: u16,
    pub body: Body,
}

impl Message {
    pub fn echo(typ: MessageType, echo: Echo) -> Self {
        Self {
            typ,
            code: 0,
            checksum: 0,
            body: Body::Echo(echo),
        }
    }

    pub fn as_echo(&self) -> Option<&Echo> {
        match &self.body {
            Body::Echo(echo) => Some(echo),
            Body::Other(_) => None,
        }
    }

    pub fn into_echo(self) -> Option<Echo> {
        match self.body {
            Body::Echo(echo) => Some(echo),
            Body::Other(_) => None,
        }
    }

    /// Encodes the message into wire format.
    pub fn marshal(&self) -> Vec<u8> {
        let body_len = match &self.body {
            Body::Echo(echo) => ECHO_HEADER_LEN + echo.data.len(),
            Body::Other(raw) => raw.len(),
        };

        let mut bytes = Vec::with_capacity(HEADER_LEN + body_len);
        // Writes into a Vec cannot fail.
        let _ = bytes.write_u8(self.typ.code());
        let _ = bytes.write_u8(self.code);
        let _ = bytes.write_u16::<BigEndian>(0);

        match &self.body {
            Body::Echo(echo) => {
                let _ = bytes.write_u16::<BigEndian>(echo.id);
                let _ = bytes.write_u16::<BigEndian>(echo.seq);
                bytes.extend_from_slice(&echo.data);
            }
            Body::Other(raw) => bytes.extend_from_slice(raw),
        }

        // The ICMPv6 checksum covers a pseudo-header only the kernel knows.
        if let MessageType::V4(_) = self.typ {
            let sum = compute_checksum(&bytes);
            bytes[2..4].copy_from_slice(&sum.to_be_bytes());
        }

        bytes
    }

    /// Decodes an ICMP message of the given family.
    pub fn parse(family: Family, data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::parse(format!(
                "ICMP message too short: {} bytes",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let raw_type = cursor.read_u8()?;
        let code = cursor.read_u8()?;
        let checksum = cursor.read_u16::<BigEndian>()?;

        let typ = match family {
            Family::V4 => MessageType::V4(Icmpv4Type(raw_type)),
            Family::V6 => MessageType::V6(Icmpv6Type(raw_type)),
        };

        let body = if typ.is_echo() {
            if data.len() < HEADER_LEN + ECHO_HEADER_LEN {
                return Err(Error::parse(format!(
                    "ICMP echo message too short: {} bytes",
                    data.len()
                )));
            }

            let id = cursor.read_u16::<BigEndian>()?;
            let seq = cursor.read_u16::<BigEndian>()?;
            let mut payload = Vec::new();
            cursor.read_to_end(&mut payload)?;

            Body::Echo(Echo {
                id,
                seq,
                data: payload,
            })
        } else {
            Body::Other(data[HEADER_LEN..].to_vec())
        };

        Ok(Self {
            typ,
            code,
            checksum,
            body,
        })
    }
}

/// Returns the length of the IPv4 header at the start of `data`, which raw
/// ICMPv4 sockets prepend to every received message.
pub fn ipv4_header_len(data: &[u8]) -> Result<usize> {
    if data.len() < IPV4_MIN_HEADER_LEN {
        return Err(Error::parse(format!(
            "IPv4 header too short: {} bytes",
            data.len()
        )));
    }

    let version = data[0] >> 4;
    if version != 4 {
        return Err(Error::parse(format!("unexpected IP version {}", version)));
    }

    let len = ((data[0] & 0x0f) as usize) * 4;
    if len < IPV4_MIN_HEADER_LEN || len > data.len() {
        return Err(Error::parse(format!("invalid IPv4 header length {}", len)));
    }

    Ok(len)
}

/// The Internet checksum (RFC 1071).
pub fn compute_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u16::from_be_bytes([word[0], word[1]]) as u32;
    }

    // Odd trailing byte is padded with zero.
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Echo {
        Echo {
            id: 1234,
            seq: 1,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        }
    }

    #[test]
    fn test_icmpv4_echo_marshal() {
        let msg = Message::echo(MessageType::V4(Icmpv4Type::ECHO_REQUEST), echo());
        let bytes = msg.marshal();

        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[0], 8);
        assert_eq!(&bytes[4..8], &[0x04, 0xd2, 0x00, 0x01]);
        assert_eq!(&bytes[8..], &[0xde, 0xad, 0xbe, 0xef]);
        // A correct checksum sums to zero when included.
        assert_eq!(compute_checksum(&bytes), 0);
    }

    #[test]
    fn test_icmpv6_checksum_left_to_kernel() {
        let msg = Message::echo(MessageType::V6(Icmpv6Type::ECHO_REQUEST), echo());
        let bytes = msg.marshal();

        assert_eq!(bytes[0], 128);
        assert_eq!(&bytes[2..4], &[0, 0]);
    }

    #[test]
    fn test_parse_echo_reply() {
        let bytes = [0x81, 0, 0x12, 0x34, 0x00, 0x07, 0x00, 0x02, 0xaa];
        let msg = Message::parse(Family::V6, &bytes).unwrap();

        assert_eq!(msg.typ, MessageType::V6(Icmpv6Type::ECHO_REPLY));
        assert_eq!(msg.checksum, 0x1234);
        assert_eq!(
            msg.into_echo(),
            Some(Echo {
                id: 7,
                seq: 2,
                data: vec![0xaa],
            })
        );
    }

    #[test]
    fn test_parse_non_echo_keeps_body() {
        let bytes = [3, 1, 0, 0, 0, 0, 0, 0, 0x45];
        let msg = Message::parse(Family::V4, &bytes).unwrap();

        assert_eq!(msg.typ, MessageType::V4(Icmpv4Type::DESTINATION_UNREACHABLE));
        assert_eq!(msg.code, 1);
        assert_eq!(msg.body, Body::Other(vec![0, 0, 0, 0, 0x45]));
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(Message::parse(Family::V4, &[0, 0]), Err(Error::Parse(_))));
        assert!(matches!(
            Message::parse(Family::V4, &[0, 0, 0, 0, 1]),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_ipv4_header_len() {
        let mut packet = vec![0u8; 28];
        packet[0] = 0x45;
        assert_eq!(ipv4_header_len(&packet).unwrap(), 20);

        // Options extend the header to 24 bytes.
        packet[0] = 0x46;
        assert_eq!(ipv4_header_len(&packet).unwrap(), 24);

        packet[0] = 0x65;
        assert!(ipv4_header_len(&packet).is_err());

        packet[0] = 0x4f;
        assert!(ipv4_header_len(&packet).is_err());
    }

    #[test]
    fn test_checksum_odd_length() {
        // 0x0100 + 0x0200 -> complement of 0x0300.
        assert_eq!(compute_checksum(&[0x01, 0x00, 0x02]), !0x0300u16);
    }
}
