//! Recursive length-prefix encoding.
//!
//! | First byte  | Meaning                                                  |
//! |-------------|----------------------------------------------------------|
//! | `0x00-0x7f` | the byte itself is a one-byte leaf                       |
//! | `0x80-0xb7` | leaf of `b - 0x80` bytes follows                         |
//! | `0xb8-0xbf` | `b - 0xb7` length bytes follow, then the leaf            |
//! | `0xc0-0xf7` | list whose payload is `b - 0xc0` bytes                   |
//! | `0xf8-0xff` | `b - 0xf7` length bytes follow, then the list payload    |
//!
//! [`decode`] is strict and reports where the input went wrong.
//! [`decode_lenient`] never fails and degrades to an empty list.

use thiserror::Error;

use crate::bytes::ByteString;

const SHORT_LEAF: u8 = 0x80;
const LONG_LEAF: u8 = 0xb7;
const SHORT_LIST: u8 = 0xc0;
const LONG_LIST: u8 = 0xf7;

/// Errors from strict RLP decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RlpError {
    #[error("empty input")]
    Empty,
    #[error("input truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("length prefix does not fit in usize")]
    LengthOverflow,
    #[error("non-canonical encoding at offset {0}")]
    NonCanonical(usize),
    #[error("{0} trailing bytes after the encoded item")]
    TrailingBytes(usize),
}

/// Result alias for RLP operations.
pub type Result<T> = std::result::Result<T, RlpError>;

/// A node of an RLP tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpNode {
    Leaf(ByteString),
    List(Vec<RlpNode>),
}

impl RlpNode {
    pub fn leaf(bytes: impl Into<ByteString>) -> Self {
        Self::Leaf(bytes.into())
    }

    pub fn list(items: Vec<RlpNode>) -> Self {
        Self::List(items)
    }

    pub fn empty_list() -> Self {
        Self::List(Vec::new())
    }

    pub fn as_leaf(&self) -> Option<&ByteString> {
        match self {
            Self::Leaf(bytes) => Some(bytes),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RlpNode]> {
        match self {
            Self::Leaf(_) => None,
            Self::List(items) => Some(items),
        }
    }

    pub fn is_empty_list(&self) -> bool {
        matches!(self, Self::List(items) if items.is_empty())
    }

    /// Serializes this node.
    pub fn encode(&self) -> ByteString {
        encode(self)
    }
}

impl Default for RlpNode {
    fn default() -> Self {
        Self::empty_list()
    }
}

impl From<ByteString> for RlpNode {
    fn from(bytes: ByteString) -> Self {
        Self::Leaf(bytes)
    }
}

impl From<Vec<RlpNode>> for RlpNode {
    fn from(items: Vec<RlpNode>) -> Self {
        Self::List(items)
    }
}

/// Encodes a tree into its RLP byte-string.
pub fn encode(node: &RlpNode) -> ByteString {
    let mut out = Vec::new();
    encode_into(node, &mut out);
    ByteString::new(out)
}

fn encode_into(node: &RlpNode, out: &mut Vec<u8>) {
    match node {
        RlpNode::Leaf(bytes) => {
            let bytes = bytes.as_slice();
            if bytes.len() == 1 && bytes[0] < SHORT_LEAF {
                out.push(bytes[0]);
            } else {
                encode_length(bytes.len(), SHORT_LEAF, out);
                out.extend_from_slice(bytes);
            }
        }
        RlpNode::List(items) => {
            let mut payload = Vec::new();
            for item in items {
                encode_into(item, &mut payload);
            }
            encode_length(payload.len(), SHORT_LIST, out);
            out.extend_from_slice(&payload);
        }
    }
}

fn encode_length(len: usize, offset: u8, out: &mut Vec<u8>) {
    if len <= 55 {
        out.push(offset + len as u8);
        return;
    }
    let be = len.to_be_bytes();
    let start = be.iter().position(|&b| b != 0).unwrap_or(be.len() - 1);
    let len_bytes = &be[start..];
    out.push(offset + 55 + len_bytes.len() as u8);
    out.extend_from_slice(len_bytes);
}

/// Strictly decodes a single RLP item spanning all of `input`.
pub fn decode(input: &[u8]) -> Result<RlpNode> {
    let (node, consumed) = decode_item(input, 0)?;
    if consumed != input.len() {
        return Err(RlpError::TrailingBytes(input.len() - consumed));
    }
    Ok(node)
}

/// Decodes `input`, yielding an empty list when it is not valid RLP.
pub fn decode_lenient(input: &[u8]) -> RlpNode {
    decode(input).unwrap_or_default()
}

/// Decodes the item at the start of `input`; `base` is its absolute offset
/// for error reporting. Returns the node and the number of bytes consumed.
fn decode_item(input: &[u8], base: usize) -> Result<(RlpNode, usize)> {
    let prefix = *input.first().ok_or(RlpError::Empty)?;

    match prefix {
        0x00..=0x7f => Ok((RlpNode::Leaf(ByteString::from(&input[..1])), 1)),
        SHORT_LEAF..=LONG_LEAF => {
            let len = (prefix - SHORT_LEAF) as usize;
            let body = take(input, 1, len)?;
            if len == 1 && body[0] < SHORT_LEAF {
                return Err(RlpError::NonCanonical(base));
            }
            Ok((RlpNode::Leaf(ByteString::from(body)), 1 + len))
        }
        0xb8..=0xbf => {
            let (len, header) = long_length(input, prefix - LONG_LEAF, base)?;
            let body = take(input, header, len)?;
            Ok((RlpNode::Leaf(ByteString::from(body)), header + len))
        }
        SHORT_LIST..=LONG_LIST => {
            let len = (prefix - SHORT_LIST) as usize;
            let payload = take(input, 1, len)?;
            let items = decode_list_payload(payload, base + 1)?;
            Ok((RlpNode::List(items), 1 + len))
        }
        0xf8..=0xff => {
            let (len, header) = long_length(input, prefix - LONG_LIST, base)?;
            let payload = take(input, header, len)?;
            let items = decode_list_payload(payload, base + header)?;
            Ok((RlpNode::List(items), header + len))
        }
    }
}

fn decode_list_payload(payload: &[u8], base: usize) -> Result<Vec<RlpNode>> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let (item, used) = decode_item(&payload[pos..], base + pos)?;
        items.push(item);
        pos += used;
    }
    Ok(items)
}

/// Reads a long-form length of `len_of_len` bytes following the prefix.
/// Returns the payload length and the header size.
fn long_length(input: &[u8], len_of_len: u8, base: usize) -> Result<(usize, usize)> {
    let len_of_len = len_of_len as usize;
    let len_bytes = take(input, 1, len_of_len)?;
    if len_bytes[0] == 0 {
        return Err(RlpError::NonCanonical(base));
    }
    if len_of_len > std::mem::size_of::<usize>() {
        return Err(RlpError::LengthOverflow);
    }
    let len = len_bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    if len <= 55 {
        return Err(RlpError::NonCanonical(base));
    }
    Ok((len, 1 + len_of_len))
}

fn take(input: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    let end = start.checked_add(len).ok_or(RlpError::LengthOverflow)?;
    input.get(start..end).ok_or(RlpError::Truncated {
        needed: end,
        available: input.len(),
    })
}
