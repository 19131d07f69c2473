//! Message headers for the MongoDB wire protocol.
use Error::ResponseError;
use Result;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

/// Fixed byte size of a serialized header.
pub const HEADER_LENGTH: i32 = 16;

/// Operations recognized in the MongoDB Wire Protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Reply = 1,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
    Msg = 2013,
}

impl OpCode {
    pub fn from_i32(value: i32) -> Option<OpCode> {
        match value {
            1 => Some(OpCode::Reply),
            2001 => Some(OpCode::Update),
            2002 => Some(OpCode::Insert),
            2004 => Some(OpCode::Query),
            2005 => Some(OpCode::GetMore),
            2006 => Some(OpCode::Delete),
            2007 => Some(OpCode::KillCursors),
            2013 => Some(OpCode::Msg),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            OpCode::Reply => "OP_REPLY",
            OpCode::Update => "OP_UPDATE",
            OpCode::Insert => "OP_INSERT",
            OpCode::Query => "OP_QUERY",
            OpCode::GetMore => "OP_GET_MORE",
            OpCode::Delete => "OP_DELETE",
            OpCode::KillCursors => "OP_KILL_CURSORS",
            OpCode::Msg => "OP_MSG",
        };
        fmt.write_str(name)
    }
}

/// Represents a header in the MongoDB Wire Protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// The length of the entire message, header included.
    pub message_length: i32,
    /// Identifies the request being sent.
    pub request_id: i32,
    /// In a reply, the `request_id` of the message being answered.
    pub response_to: i32,
    /// Identifies which operation the message represents.
    pub op_code: OpCode,
}

impl Header {
    pub fn new(message_length: i32, request_id: i32, response_to: i32, op_code: OpCode) -> Header {
        Header {
            message_length: message_length,
            request_id: request_id,
            response_to: response_to,
            op_code: op_code,
        }
    }

    /// Constructs a request header, where `response_to` is unused.
    pub fn new_request(message_length: i32, request_id: i32, op_code: OpCode) -> Header {
        Header::new(message_length, request_id, 0, op_code)
    }

    /// Serializes the header into little-endian bytes.
    pub fn write<W: Write>(&self, buffer: &mut W) -> Result<()> {
        buffer.write_i32::<LittleEndian>(self.message_length)?;
        buffer.write_i32::<LittleEndian>(self.request_id)?;
        buffer.write_i32::<LittleEndian>(self.response_to)?;
        buffer.write_i32::<LittleEndian>(self.op_code as i32)?;
        Ok(())
    }

    /// Reads a serialized header from a buffer.
    pub fn read<R: Read>(buffer: &mut R) -> Result<Header> {
        let message_length = buffer.read_i32::<LittleEndian>()?;
        let request_id = buffer.read_i32::<LittleEndian>()?;
        let response_to = buffer.read_i32::<LittleEndian>()?;
        let op_code_raw = buffer.read_i32::<LittleEndian>()?;

        if message_length < HEADER_LENGTH {
            return Err(ResponseError(
                format!("message length {} is shorter than a header", message_length),
            ));
        }
        let op_code = OpCode::from_i32(op_code_raw).ok_or_else(|| {
            ResponseError(format!("unknown opcode {} in reply header", op_code_raw))
        })?;

        Ok(Header::new(message_length, request_id, response_to, op_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trip() {
        let header = Header::new_request(60, 7, OpCode::Query);
        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();
        assert_eq!(
            buffer,
            vec![60, 0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0, 212, 7, 0, 0]
        );

        let parsed = Header::read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn header_rejects_unknown_opcode() {
        let bytes = vec![16, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 99, 0, 0, 0];
        assert!(Header::read(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn header_rejects_undersized_length() {
        let bytes = vec![4, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        assert!(Header::read(&mut Cursor::new(bytes)).is_err());
    }
}
