use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use rand::RngCore;
use std::io::{Cursor, Read};
use std::net::Ipv4Addr;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

pub const ICMP_HEADER_LEN: usize = 8;
pub const IPV4_MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct IcmpPacket {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl IcmpPacket {
    /// Echo request carrying `payload_size` random bytes, checksum already set.
    pub fn new_echo_request(identifier: u16, sequence: u16, payload_size: usize) -> Self {
        let mut payload = vec![0u8; payload_size];
        rand::thread_rng().fill_bytes(&mut payload);

        let mut packet = Self {
            icmp_type: ICMP_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier,
            sequence,
            payload,
        };

        packet.calculate_checksum();
        packet
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        if data.len() < ICMP_HEADER_LEN {
            return Err(anyhow::anyhow!("ICMP packet too short: {} bytes", data.len()));
        }

        let mut cursor = Cursor::new(data);
        let icmp_type = cursor.read_u8()?;
        let code = cursor.read_u8()?;
        let checksum = cursor.read_u16::<BigEndian>()?;
        let identifier = cursor.read_u16::<BigEndian>()?;
        let sequence = cursor.read_u16::<BigEndian>()?;

        let mut payload = Vec::new();
        cursor.read_to_end(&mut payload)?;

        Ok(Self {
            icmp_type,
            code,
            checksum,
            identifier,
            sequence,
            payload,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; ICMP_HEADER_LEN + self.payload.len()];
        bytes[0] = self.icmp_type;
        bytes[1] = self.code;
        BigEndian::write_u16(&mut bytes[2..4], self.checksum);
        BigEndian::write_u16(&mut bytes[4..6], self.identifier);
        BigEndian::write_u16(&mut bytes[6..8], self.sequence);
        bytes[ICMP_HEADER_LEN..].copy_from_slice(&self.payload);
        bytes
    }

    pub fn calculate_checksum(&mut self) {
        self.checksum = 0;
        self.checksum = checksum(&self.to_bytes());
    }
}

/// Internet checksum (RFC 1071) over `data`.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u64 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += BigEndian::read_u16(word) as u64;
    }

    // A trailing odd byte is the high half of a zero-padded word.
    if let [last] = words.remainder() {
        sum += (*last as u64) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// Serialized echo request, exactly `8 + payload_size` bytes long.
pub fn build_echo_request(identifier: u16, sequence: u16, payload_size: usize) -> Vec<u8> {
    IcmpPacket::new_echo_request(identifier, sequence, payload_size).to_bytes()
}

/// An ICMP message as received on a raw IPv4 socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpReply {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub ttl: u8,
    pub source: Ipv4Addr,
    pub payload_size: usize,
    /// Echo identifier quoted back inside a time-exceeded or unreachable message.
    pub quoted_identifier: Option<u16>,
}

impl IcmpReply {
    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type == ICMP_ECHO_REPLY
    }

    pub fn is_time_exceeded(&self) -> bool {
        self.icmp_type == ICMP_TIME_EXCEEDED
    }

    pub fn is_dest_unreachable(&self) -> bool {
        self.icmp_type == ICMP_DEST_UNREACHABLE
    }
}

/// Identifier of the echo request an ICMP error message quotes back.
///
/// The quote is the offending IPv4 header followed by its first 8 payload bytes.
fn quoted_echo_identifier(quote: &[u8]) -> Option<u16> {
    let first = *quote.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let header_len = ((first & 0x0F) as usize) * 4;
    if header_len < IPV4_MIN_HEADER_LEN || quote.len() < header_len + ICMP_HEADER_LEN {
        return None;
    }
    // Protocol 1 is ICMP.
    if quote[9] != 1 || quote[header_len] != ICMP_ECHO_REQUEST {
        return None;
    }
    Some(BigEndian::read_u16(&quote[header_len + 4..header_len + 6]))
}

/// Parse a raw datagram (IPv4 header followed by ICMP) into an [`IcmpReply`].
///
/// The IP header length comes from the IHL field, so headers carrying options
/// are handled. Anything too short or not IPv4 is rejected.
pub fn parse_icmp_response(datagram: &[u8]) -> anyhow::Result<IcmpReply> {
    if datagram.len() < IPV4_MIN_HEADER_LEN {
        return Err(anyhow::anyhow!(
            "datagram too short for an IPv4 header: {} bytes",
            datagram.len()
        ));
    }

    let version = datagram[0] >> 4;
    if version != 4 {
        return Err(anyhow::anyhow!("not an IPv4 datagram (version {})", version));
    }

    let header_len = ((datagram[0] & 0x0F) as usize) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(anyhow::anyhow!("invalid IPv4 header length {}", header_len));
    }
    if datagram.len() < header_len + ICMP_HEADER_LEN {
        return Err(anyhow::anyhow!(
            "datagram truncated: {} bytes, need at least {}",
            datagram.len(),
            header_len + ICMP_HEADER_LEN
        ));
    }

    let ttl = datagram[8];
    let source = Ipv4Addr::new(datagram[12], datagram[13], datagram[14], datagram[15]);
    let icmp = IcmpPacket::from_bytes(&datagram[header_len..])?;

    let quoted_identifier = match icmp.icmp_type {
        ICMP_TIME_EXCEEDED | ICMP_DEST_UNREACHABLE => quoted_echo_identifier(&icmp.payload),
        _ => None,
    };

    Ok(IcmpReply {
        icmp_type: icmp.icmp_type,
        code: icmp.code,
        checksum: icmp.checksum,
        identifier: icmp.identifier,
        sequence: icmp.sequence,
        ttl,
        source,
        payload_size: icmp.payload.len(),
        quoted_identifier,
    })
}
