//! Binary ILP packet codec.
//!
//! Packets are a closed tagged union: quoting (ILQP) requests/responses and
//! the Prepare/Fulfill/Reject forwarding packets. The single dispatch point
//! in the message router matches this enum exhaustively, so adding a packet
//! kind without handling it is a compile error.
//!
//! Wire format per packet: a one-byte type tag followed by the OER
//! var-octet-string encoded contents. Quoting packets use the legacy ILQP
//! tags (2-7); Prepare/Fulfill/Reject use the ILPv4 tags (12-14).

use crate::address::{Address, AddressError};
use crate::curve::LiquidityCurve;
use crate::errors::{ErrorCode, ProtocolError};
use crate::oer::{ReadOerExt, WriteOerExt};
use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes};
use chrono::{DateTime, TimeZone, Utc};
use std::convert::TryFrom;
use std::io::Read;
use std::str;
use std::time::SystemTime;
use thiserror::Error;

static INTERLEDGER_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid utf8: {0}")]
    Utf8(#[from] str::Utf8Error),
    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("invalid curve: {0}")]
    Curve(#[from] crate::curve::CurveError),
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    LiquidityRequest = 2,
    LiquidityResponse = 3,
    BySourceRequest = 4,
    BySourceResponse = 5,
    ByDestinationRequest = 6,
    ByDestinationResponse = 7,
    Prepare = 12,
    Fulfill = 13,
    Reject = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = ParseError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            2 => Ok(PacketType::LiquidityRequest),
            3 => Ok(PacketType::LiquidityResponse),
            4 => Ok(PacketType::BySourceRequest),
            5 => Ok(PacketType::BySourceResponse),
            6 => Ok(PacketType::ByDestinationRequest),
            7 => Ok(PacketType::ByDestinationResponse),
            12 => Ok(PacketType::Prepare),
            13 => Ok(PacketType::Fulfill),
            14 => Ok(PacketType::Reject),
            other => Err(ParseError::InvalidPacket(format!(
                "unknown packet type: {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuoteLiquidityRequest {
    pub destination_account: Address,
    /// How long the receiver needs to fulfill the payment, in milliseconds.
    pub destination_hold_duration: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuoteLiquidityResponse {
    pub curve: LiquidityCurve,
    pub applies_to_prefix: String,
    pub source_hold_duration: u32,
    pub expires_at: SystemTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuoteBySourceRequest {
    pub destination_account: Address,
    pub source_amount: u64,
    pub destination_hold_duration: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuoteBySourceResponse {
    pub destination_amount: u64,
    pub source_hold_duration: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuoteByDestinationRequest {
    pub destination_account: Address,
    pub destination_amount: u64,
    pub destination_hold_duration: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuoteByDestinationResponse {
    pub source_amount: u64,
    pub source_hold_duration: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prepare {
    pub amount: u64,
    pub destination: Address,
    pub execution_condition: [u8; 32],
    pub expires_at: SystemTime,
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fulfill {
    pub fulfillment: [u8; 32],
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reject {
    pub code: ErrorCode,
    pub message: String,
    /// Hop chain this error has traversed, extended by each relaying node.
    pub forwarded_by: Vec<Address>,
    pub data: Bytes,
}

impl From<ProtocolError> for Reject {
    fn from(err: ProtocolError) -> Self {
        Reject {
            code: err.code,
            message: err.message,
            forwarded_by: err.forwarded_by,
            data: Bytes::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    LiquidityRequest(QuoteLiquidityRequest),
    LiquidityResponse(QuoteLiquidityResponse),
    BySourceRequest(QuoteBySourceRequest),
    BySourceResponse(QuoteBySourceResponse),
    ByDestinationRequest(QuoteByDestinationRequest),
    ByDestinationResponse(QuoteByDestinationResponse),
    Prepare(Prepare),
    Fulfill(Fulfill),
    Reject(Reject),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::LiquidityRequest(_) => PacketType::LiquidityRequest,
            Packet::LiquidityResponse(_) => PacketType::LiquidityResponse,
            Packet::BySourceRequest(_) => PacketType::BySourceRequest,
            Packet::BySourceResponse(_) => PacketType::BySourceResponse,
            Packet::ByDestinationRequest(_) => PacketType::ByDestinationRequest,
            Packet::ByDestinationResponse(_) => PacketType::ByDestinationResponse,
            Packet::Prepare(_) => PacketType::Prepare,
            Packet::Fulfill(_) => PacketType::Fulfill,
            Packet::Reject(_) => PacketType::Reject,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, ParseError> {
        let mut reader = bytes;
        let tag = PacketType::try_from(reader.read_u8()?)?;
        let mut contents = reader.read_var_octet_string()?;
        let reader = &mut contents;
        match tag {
            PacketType::LiquidityRequest => Ok(Packet::LiquidityRequest(QuoteLiquidityRequest {
                destination_account: read_address(reader)?,
                destination_hold_duration: reader.read_u32::<BigEndian>()?,
            })),
            PacketType::LiquidityResponse => {
                let num_points = reader.read_var_uint()? as usize;
                let mut points = Vec::with_capacity(num_points);
                for _ in 0..num_points {
                    let x = reader.read_u64::<BigEndian>()?;
                    let y = reader.read_u64::<BigEndian>()?;
                    points.push((x, y));
                }
                Ok(Packet::LiquidityResponse(QuoteLiquidityResponse {
                    curve: LiquidityCurve::new(points)?,
                    applies_to_prefix: str::from_utf8(reader.read_var_octet_string()?)?
                        .to_string(),
                    source_hold_duration: reader.read_u32::<BigEndian>()?,
                    expires_at: read_timestamp(reader)?,
                }))
            }
            PacketType::BySourceRequest => Ok(Packet::BySourceRequest(QuoteBySourceRequest {
                destination_account: read_address(reader)?,
                source_amount: reader.read_u64::<BigEndian>()?,
                destination_hold_duration: reader.read_u32::<BigEndian>()?,
            })),
            PacketType::BySourceResponse => Ok(Packet::BySourceResponse(QuoteBySourceResponse {
                destination_amount: reader.read_u64::<BigEndian>()?,
                source_hold_duration: reader.read_u32::<BigEndian>()?,
            })),
            PacketType::ByDestinationRequest => {
                Ok(Packet::ByDestinationRequest(QuoteByDestinationRequest {
                    destination_account: read_address(reader)?,
                    destination_amount: reader.read_u64::<BigEndian>()?,
                    destination_hold_duration: reader.read_u32::<BigEndian>()?,
                }))
            }
            PacketType::ByDestinationResponse => {
                Ok(Packet::ByDestinationResponse(QuoteByDestinationResponse {
                    source_amount: reader.read_u64::<BigEndian>()?,
                    source_hold_duration: reader.read_u32::<BigEndian>()?,
                }))
            }
            PacketType::Prepare => {
                let amount = reader.read_u64::<BigEndian>()?;
                let expires_at = read_timestamp(reader)?;
                let mut execution_condition = [0u8; 32];
                reader.read_exact(&mut execution_condition)?;
                Ok(Packet::Prepare(Prepare {
                    amount,
                    expires_at,
                    execution_condition,
                    destination: read_address(reader)?,
                    data: Bytes::from(reader.read_var_octet_string()?),
                }))
            }
            PacketType::Fulfill => {
                let mut fulfillment = [0u8; 32];
                reader.read_exact(&mut fulfillment)?;
                Ok(Packet::Fulfill(Fulfill {
                    fulfillment,
                    data: Bytes::from(reader.read_var_octet_string()?),
                }))
            }
            PacketType::Reject => {
                let mut code = [0u8; 3];
                reader.read_exact(&mut code)?;
                let message = str::from_utf8(reader.read_var_octet_string()?)?.to_string();
                let num_hops = reader.read_var_uint()? as usize;
                let mut forwarded_by = Vec::with_capacity(num_hops);
                for _ in 0..num_hops {
                    forwarded_by.push(read_address(reader)?);
                }
                Ok(Packet::Reject(Reject {
                    code: ErrorCode::new(code),
                    message,
                    forwarded_by,
                    data: Bytes::from(reader.read_var_octet_string()?),
                }))
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut contents = Vec::new();
        match self {
            Packet::LiquidityRequest(packet) => {
                contents.put_var_octet_string(packet.destination_account.as_str().as_bytes());
                contents.put_u32_be(packet.destination_hold_duration);
            }
            Packet::LiquidityResponse(packet) => {
                contents.put_var_uint(packet.curve.points().len() as u64);
                for (x, y) in packet.curve.points() {
                    contents.put_u64_be(*x);
                    contents.put_u64_be(*y);
                }
                contents.put_var_octet_string(packet.applies_to_prefix.as_bytes());
                contents.put_u32_be(packet.source_hold_duration);
                put_timestamp(&mut contents, packet.expires_at);
            }
            Packet::BySourceRequest(packet) => {
                contents.put_var_octet_string(packet.destination_account.as_str().as_bytes());
                contents.put_u64_be(packet.source_amount);
                contents.put_u32_be(packet.destination_hold_duration);
            }
            Packet::BySourceResponse(packet) => {
                contents.put_u64_be(packet.destination_amount);
                contents.put_u32_be(packet.source_hold_duration);
            }
            Packet::ByDestinationRequest(packet) => {
                contents.put_var_octet_string(packet.destination_account.as_str().as_bytes());
                contents.put_u64_be(packet.destination_amount);
                contents.put_u32_be(packet.destination_hold_duration);
            }
            Packet::ByDestinationResponse(packet) => {
                contents.put_u64_be(packet.source_amount);
                contents.put_u32_be(packet.source_hold_duration);
            }
            Packet::Prepare(packet) => {
                contents.put_u64_be(packet.amount);
                put_timestamp(&mut contents, packet.expires_at);
                contents.put_slice(&packet.execution_condition);
                contents.put_var_octet_string(packet.destination.as_str().as_bytes());
                contents.put_var_octet_string(&packet.data);
            }
            Packet::Fulfill(packet) => {
                contents.put_slice(&packet.fulfillment);
                contents.put_var_octet_string(&packet.data);
            }
            Packet::Reject(packet) => {
                contents.put_slice(&packet.code.as_bytes());
                contents.put_var_octet_string(packet.message.as_bytes());
                contents.put_var_uint(packet.forwarded_by.len() as u64);
                for hop in packet.forwarded_by.iter() {
                    contents.put_var_octet_string(hop.as_str().as_bytes());
                }
                contents.put_var_octet_string(&packet.data);
            }
        }
        let mut buffer = Vec::with_capacity(contents.len() + 4);
        buffer.put_u8(self.packet_type() as u8);
        buffer.put_var_octet_string(&contents);
        Bytes::from(buffer)
    }
}

fn read_address(reader: &mut &[u8]) -> Result<Address, ParseError> {
    let raw = str::from_utf8(reader.read_var_octet_string()?)?;
    Ok(Address::new(raw)?)
}

fn read_timestamp(reader: &mut &[u8]) -> Result<SystemTime, ParseError> {
    let raw = str::from_utf8(reader.read_var_octet_string()?)?;
    let timestamp = Utc.datetime_from_str(raw, INTERLEDGER_TIMESTAMP_FORMAT)?;
    Ok(SystemTime::from(timestamp))
}

fn put_timestamp<B: BufMut>(buffer: &mut B, time: SystemTime) {
    let formatted = DateTime::<Utc>::from(time)
        .format(INTERLEDGER_TIMESTAMP_FORMAT)
        .to_string();
    buffer.put_var_octet_string(formatted.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    // Timestamps on the wire have millisecond precision, so fixtures use
    // whole milliseconds to make round trips exact.
    fn expiry() -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(1_434_412_800_123)
    }

    fn assert_round_trips(packet: Packet) {
        let encoded = packet.encode();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
        // byte-for-byte: re-encoding the decoded packet is identical
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn prepare_round_trips() {
        assert_round_trips(Packet::Prepare(Prepare {
            amount: 10_700,
            destination: Address::new("eur-ledger.bob").unwrap(),
            execution_condition: [7; 32],
            expires_at: expiry(),
            data: Bytes::from(&b"some attached data"[..]),
        }));
    }

    #[test]
    fn quote_packets_round_trip() {
        assert_round_trips(Packet::BySourceRequest(QuoteBySourceRequest {
            destination_account: Address::new("eur-ledger.bob").unwrap(),
            source_amount: 10_700,
            destination_hold_duration: 5_000,
        }));
        assert_round_trips(Packet::LiquidityResponse(QuoteLiquidityResponse {
            curve: LiquidityCurve::new(vec![(0, 0), (1_000, 500)]).unwrap(),
            applies_to_prefix: "eur-ledger".to_string(),
            source_hold_duration: 6_000,
            expires_at: expiry(),
        }));
    }

    #[test]
    fn reject_round_trips_with_hop_chain() {
        assert_round_trips(Packet::Reject(Reject {
            code: ErrorCode::F02_UNREACHABLE,
            message: "no route found".to_string(),
            forwarded_by: vec![
                Address::new("example.east").unwrap(),
                Address::new("example.west").unwrap(),
            ],
            data: Bytes::new(),
        }));
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let result = Packet::decode(&[99, 1, 0]);
        assert!(matches!(result, Err(ParseError::InvalidPacket(_))));
    }

    #[test]
    fn type_tag_is_first_byte() {
        let fulfill = Packet::Fulfill(Fulfill {
            fulfillment: [0; 32],
            data: Bytes::new(),
        });
        assert_eq!(fulfill.encode()[0], 13);
    }
}
