//! Wire protocol operational client-server communication logic.
use Error::{ArgumentError, ResponseError};
use Result;

use bson;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use wire_protocol::flags::{OpInsertFlags, OpMsgFlags, OpQueryFlags, OpRemoveFlags, OpReplyFlags,
                           OpUpdateFlags};
use wire_protocol::header::{Header, HEADER_LENGTH, OpCode};

/// Documents up to this size are staged through stack storage while reading
/// a reply, skipping the per-document heap allocation.
const SHORT_DOCUMENT_LENGTH: usize = 512;

trait ByteLength {
    /// Calculates the number of bytes in the serialized version of the value.
    fn byte_length(&self) -> Result<i32>;
}

impl ByteLength for bson::Document {
    fn byte_length(&self) -> Result<i32> {
        let mut scratch = Vec::new();
        bson::encode_document(&mut scratch, self)?;
        Ok(scratch.len() as i32)
    }
}

/// Represents a message in the MongoDB Wire Protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    OpReply {
        /// The message header.
        header: Header,
        /// A bit vector of reply options.
        flags: OpReplyFlags,
        /// Uniquely identifies the cursor being returned.
        cursor_id: i64,
        /// The starting position for the cursor.
        starting_from: i32,
        /// The total number of documents the server claims to return.
        number_returned: i32,
        /// The documents being returned.
        documents: Vec<bson::Document>,
    },
    OpUpdate {
        /// The message header.
        header: Header,
        // The wire protocol specifies that a 32-bit 0 field goes here
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// A bit vector of update options.
        flags: OpUpdateFlags,
        /// Identifies the document(s) to be updated.
        selector: bson::Document,
        /// Instruction document for how to update the document(s).
        update: bson::Document,
    },
    OpInsert {
        /// The message header.
        header: Header,
        /// A bit vector of insert options.
        flags: OpInsertFlags,
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// The documents to be inserted.
        documents: Vec<bson::Document>,
    },
    OpQuery {
        /// The message header.
        header: Header,
        /// A bit vector of query options.
        flags: OpQueryFlags,
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// The number of initial documents to skip over in the query results.
        number_to_skip: i32,
        /// The total number of documents that should be returned by the query.
        number_to_return: i32,
        /// Specifies which documents to return.
        query: bson::Document,
        /// An optional projection of which fields should be present in the
        /// documents to be returned by the query.
        return_field_selector: Option<bson::Document>,
    },
    OpGetMore {
        /// The message header.
        header: Header,
        // The wire protocol specifies that a 32-bit 0 field goes here
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// The total number of documents that should be returned by the query.
        number_to_return: i32,
        /// Uniquely identifies the cursor being read from.
        cursor_id: i64,
    },
    OpDelete {
        /// The message header.
        header: Header,
        // The wire protocol specifies that a 32-bit 0 field goes here
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// A bit vector of delete options.
        flags: OpRemoveFlags,
        /// Identifies the document(s) to be removed.
        selector: bson::Document,
    },
    OpKillCursors {
        /// The message header.
        header: Header,
        // The wire protocol specifies that a 32-bit 0 field goes here
        /// The server cursors being released.
        cursor_ids: Vec<i64>,
    },
    OpMsg {
        /// The message header.
        header: Header,
        /// A bit vector of message options.
        flags: OpMsgFlags,
        /// The single body section carrying the command or reply document.
        document: bson::Document,
    },
}

impl Message {
    /// Constructs a new message for a reply.
    fn with_reply(
        header: Header,
        flags: i32,
        cursor_id: i64,
        starting_from: i32,
        number_returned: i32,
        documents: Vec<bson::Document>,
    ) -> Message {
        Message::OpReply {
            header: header,
            flags: OpReplyFlags::from_bits_truncate(flags),
            cursor_id: cursor_id,
            starting_from: starting_from,
            number_returned: number_returned,
            documents: documents,
        }
    }

    /// Constructs a new message request for an update.
    pub fn with_update(
        request_id: i32,
        namespace: String,
        flags: OpUpdateFlags,
        selector: bson::Document,
        update: bson::Document,
    ) -> Result<Message> {
        // Add an extra byte after the string for null-termination.
        let string_length = namespace.len() as i32 + 1;

        // There are two i32 fields: the wire protocol-specified ZERO field
        // and the flag bit vector.
        let i32_length = 8;

        let total_length = HEADER_LENGTH + i32_length + string_length +
            selector.byte_length()? + update.byte_length()?;

        Ok(Message::OpUpdate {
            header: Header::new_request(total_length, request_id, OpCode::Update),
            namespace: namespace,
            flags: flags,
            selector: selector,
            update: update,
        })
    }

    /// Constructs a new message request for an insertion.
    pub fn with_insert(
        request_id: i32,
        flags: OpInsertFlags,
        namespace: String,
        documents: Vec<bson::Document>,
    ) -> Result<Message> {
        // Add an extra byte after the string for null-termination.
        let string_length = namespace.len() as i32 + 1;

        let mut total_length = HEADER_LENGTH + 4 + string_length;
        for doc in &documents {
            total_length += doc.byte_length()?;
        }

        Ok(Message::OpInsert {
            header: Header::new_request(total_length, request_id, OpCode::Insert),
            flags: flags,
            namespace: namespace,
            documents: documents,
        })
    }

    /// Constructs a new message request for a query.
    pub fn with_query(
        request_id: i32,
        flags: OpQueryFlags,
        namespace: String,
        number_to_skip: i32,
        number_to_return: i32,
        query: bson::Document,
        return_field_selector: Option<bson::Document>,
    ) -> Result<Message> {
        // There are three i32 fields (since OpQueryFlags is represented as a
        // 32-bit vector in the wire protocol).
        let i32_length = 12;

        // Add an extra byte after the string for null-termination.
        let string_length = namespace.len() as i32 + 1;

        let mut total_length = HEADER_LENGTH + i32_length + string_length + query.byte_length()?;
        if let Some(ref doc) = return_field_selector {
            total_length += doc.byte_length()?;
        }

        Ok(Message::OpQuery {
            header: Header::new_request(total_length, request_id, OpCode::Query),
            flags: flags,
            namespace: namespace,
            number_to_skip: number_to_skip,
            number_to_return: number_to_return,
            query: query,
            return_field_selector: return_field_selector,
        })
    }

    /// Constructs a new "get more" request message.
    pub fn with_get_more(
        request_id: i32,
        namespace: String,
        number_to_return: i32,
        cursor_id: i64,
    ) -> Message {
        // Two i32 fields (the reserved ZERO and numberToReturn), plus the
        // null-terminated namespace and the 8-byte cursor id.
        let total_length = HEADER_LENGTH + 8 + namespace.len() as i32 + 1 + 8;

        Message::OpGetMore {
            header: Header::new_request(total_length, request_id, OpCode::GetMore),
            namespace: namespace,
            number_to_return: number_to_return,
            cursor_id: cursor_id,
        }
    }

    /// Constructs a new message request for a deletion.
    pub fn with_delete(
        request_id: i32,
        namespace: String,
        flags: OpRemoveFlags,
        selector: bson::Document,
    ) -> Result<Message> {
        // The reserved ZERO and the flag bit vector.
        let i32_length = 8;
        let string_length = namespace.len() as i32 + 1;
        let total_length = HEADER_LENGTH + i32_length + string_length + selector.byte_length()?;

        Ok(Message::OpDelete {
            header: Header::new_request(total_length, request_id, OpCode::Delete),
            namespace: namespace,
            flags: flags,
            selector: selector,
        })
    }

    /// Constructs a new request to release server cursors.
    pub fn with_kill_cursors(request_id: i32, cursor_ids: Vec<i64>) -> Message {
        // The reserved ZERO and the cursor count.
        let total_length = HEADER_LENGTH + 8 + 8 * cursor_ids.len() as i32;

        Message::OpKillCursors {
            header: Header::new_request(total_length, request_id, OpCode::KillCursors),
            cursor_ids: cursor_ids,
        }
    }

    /// Constructs a new command message in the modern OP_MSG framing.
    pub fn with_msg(
        request_id: i32,
        flags: OpMsgFlags,
        document: bson::Document,
    ) -> Result<Message> {
        // The flag bit vector plus the single body section kind byte.
        let total_length = HEADER_LENGTH + 5 + document.byte_length()?;

        Ok(Message::OpMsg {
            header: Header::new_request(total_length, request_id, OpCode::Msg),
            flags: flags,
            document: document,
        })
    }

    /// The header of the message.
    pub fn header(&self) -> &Header {
        match *self {
            Message::OpReply { ref header, .. } |
            Message::OpUpdate { ref header, .. } |
            Message::OpInsert { ref header, .. } |
            Message::OpQuery { ref header, .. } |
            Message::OpGetMore { ref header, .. } |
            Message::OpDelete { ref header, .. } |
            Message::OpKillCursors { ref header, .. } |
            Message::OpMsg { ref header, .. } => header,
        }
    }

    /// Writes a serialized update message to the buffer.
    fn write_update<W: Write>(
        buffer: &mut W,
        header: &Header,
        namespace: &str,
        flags: &OpUpdateFlags,
        selector: &bson::Document,
        update: &bson::Document,
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(0)?;
        write_cstring(buffer, namespace)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;
        bson::encode_document(buffer, selector)?;
        bson::encode_document(buffer, update)?;
        Ok(())
    }

    /// Writes a serialized insert message to the buffer.
    fn write_insert<W: Write>(
        buffer: &mut W,
        header: &Header,
        flags: &OpInsertFlags,
        namespace: &str,
        documents: &[bson::Document],
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;
        write_cstring(buffer, namespace)?;
        for doc in documents {
            bson::encode_document(buffer, doc)?;
        }
        Ok(())
    }

    /// Writes a serialized query message to the buffer.
    fn write_query<W: Write>(
        buffer: &mut W,
        header: &Header,
        flags: &OpQueryFlags,
        namespace: &str,
        number_to_skip: i32,
        number_to_return: i32,
        query: &bson::Document,
        return_field_selector: &Option<bson::Document>,
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;
        write_cstring(buffer, namespace)?;
        buffer.write_i32::<LittleEndian>(number_to_skip)?;
        buffer.write_i32::<LittleEndian>(number_to_return)?;
        bson::encode_document(buffer, query)?;
        if let Some(ref doc) = *return_field_selector {
            bson::encode_document(buffer, doc)?;
        }
        Ok(())
    }

    /// Writes a serialized "get more" request to the buffer.
    fn write_get_more<W: Write>(
        buffer: &mut W,
        header: &Header,
        namespace: &str,
        number_to_return: i32,
        cursor_id: i64,
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(0)?;
        write_cstring(buffer, namespace)?;
        buffer.write_i32::<LittleEndian>(number_to_return)?;
        buffer.write_i64::<LittleEndian>(cursor_id)?;
        Ok(())
    }

    /// Writes a serialized delete message to the buffer.
    fn write_delete<W: Write>(
        buffer: &mut W,
        header: &Header,
        namespace: &str,
        flags: &OpRemoveFlags,
        selector: &bson::Document,
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(0)?;
        write_cstring(buffer, namespace)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;
        bson::encode_document(buffer, selector)?;
        Ok(())
    }

    /// Writes a serialized kill-cursors request to the buffer.
    fn write_kill_cursors<W: Write>(
        buffer: &mut W,
        header: &Header,
        cursor_ids: &[i64],
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(0)?;
        buffer.write_i32::<LittleEndian>(cursor_ids.len() as i32)?;
        for id in cursor_ids {
            buffer.write_i64::<LittleEndian>(*id)?;
        }
        Ok(())
    }

    /// Writes a serialized OP_MSG command to the buffer.
    fn write_msg<W: Write>(
        buffer: &mut W,
        header: &Header,
        flags: &OpMsgFlags,
        document: &bson::Document,
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_u32::<LittleEndian>(flags.bits())?;
        // Section kind 0: a single body document.
        buffer.write_u8(0)?;
        bson::encode_document(buffer, document)?;
        Ok(())
    }

    /// Attempts to write the serialized message to a buffer.
    pub fn write<W: Write>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            // Only the server should send replies
            Message::OpReply { .. } => {
                Err(ArgumentError(
                    String::from("OP_REPLY should not be sent by the client."),
                ))
            }
            Message::OpUpdate {
                ref header,
                ref namespace,
                ref flags,
                ref selector,
                ref update,
            } => Message::write_update(buffer, header, namespace, flags, selector, update),
            Message::OpInsert {
                ref header,
                ref flags,
                ref namespace,
                ref documents,
            } => Message::write_insert(buffer, header, flags, namespace, documents),
            Message::OpQuery {
                ref header,
                ref flags,
                ref namespace,
                number_to_skip,
                number_to_return,
                ref query,
                ref return_field_selector,
            } => {
                Message::write_query(
                    buffer,
                    header,
                    flags,
                    namespace,
                    number_to_skip,
                    number_to_return,
                    query,
                    return_field_selector,
                )
            }
            Message::OpGetMore {
                ref header,
                ref namespace,
                number_to_return,
                cursor_id,
            } => Message::write_get_more(buffer, header, namespace, number_to_return, cursor_id),
            Message::OpDelete {
                ref header,
                ref namespace,
                ref flags,
                ref selector,
            } => Message::write_delete(buffer, header, namespace, flags, selector),
            Message::OpKillCursors {
                ref header,
                ref cursor_ids,
            } => Message::write_kill_cursors(buffer, header, cursor_ids),
            Message::OpMsg {
                ref header,
                ref flags,
                ref document,
            } => Message::write_msg(buffer, header, flags, document),
        }
    }

    /// Reads a serialized reply message from a buffer.
    fn read_reply<R: Read>(buffer: &mut R, header: Header) -> Result<Message> {
        let mut remaining = i64::from(header.message_length - HEADER_LENGTH);

        let flags = buffer.read_i32::<LittleEndian>()?;
        let cursor_id = buffer.read_i64::<LittleEndian>()?;
        let starting_from = buffer.read_i32::<LittleEndian>()?;
        let number_returned = buffer.read_i32::<LittleEndian>()?;
        remaining -= 20;

        let mut documents = Vec::new();
        while remaining > 4 {
            let (doc, length) = read_document(buffer)?;
            remaining -= i64::from(length);
            documents.push(doc);
        }
        finish_reply(buffer, remaining)?;

        Ok(Message::with_reply(
            header,
            flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        ))
    }

    /// Reads a serialized OP_MSG reply from a buffer.
    fn read_msg<R: Read>(buffer: &mut R, header: Header) -> Result<Message> {
        let mut remaining = i64::from(header.message_length - HEADER_LENGTH);

        let flags = buffer.read_u32::<LittleEndian>()?;
        let kind = buffer.read_u8()?;
        remaining -= 5;
        if kind != 0 {
            return Err(ResponseError(
                format!("unsupported OP_MSG section kind {} in reply", kind),
            ));
        }

        let (document, length) = read_document(buffer)?;
        remaining -= i64::from(length);
        // An optional CRC-32C trailer may follow; it is consumed unverified.
        finish_reply(buffer, remaining)?;

        Ok(Message::OpMsg {
            header: header,
            flags: OpMsgFlags::from_bits_truncate(flags),
            document: document,
        })
    }

    /// Attempts to read a serialized reply message from a buffer.
    pub fn read<R: Read>(buffer: &mut R) -> Result<Message> {
        let header = Header::read(buffer)?;
        match header.op_code {
            OpCode::Reply => Message::read_reply(buffer, header),
            OpCode::Msg => Message::read_msg(buffer, header),
            opcode => {
                Err(ResponseError(format!(
                    "expected to read OP_REPLY or OP_MSG but instead found opcode {}",
                    opcode
                )))
            }
        }
    }
}

fn write_cstring<W: Write>(buffer: &mut W, string: &str) -> Result<()> {
    buffer.write_all(string.as_bytes())?;
    buffer.write_u8(0)?;
    Ok(())
}

/// Reads one length-prefixed BSON document, returning it along with the
/// number of bytes consumed. Small documents take the stack path.
fn read_document<R: Read>(buffer: &mut R) -> Result<(bson::Document, i32)> {
    let length = buffer.read_i32::<LittleEndian>()?;
    if length < 5 {
        return Err(ResponseError(
            format!("invalid document length {} in reply", length),
        ));
    }

    let total = length as usize;
    let mut stack_storage = [0u8; SHORT_DOCUMENT_LENGTH];
    let doc = if total <= SHORT_DOCUMENT_LENGTH {
        let bytes = &mut stack_storage[..total];
        LittleEndian::write_i32(&mut bytes[..4], length);
        buffer.read_exact(&mut bytes[4..])?;
        bson::decode_document(&mut io::Cursor::new(&bytes[..]))?
    } else {
        let mut bytes = vec![0u8; total];
        LittleEndian::write_i32(&mut bytes[..4], length);
        buffer.read_exact(&mut bytes[4..])?;
        bson::decode_document(&mut io::Cursor::new(&bytes[..]))?
    };

    Ok((doc, length))
}

/// Closes out a reply: unread declared bytes are drained and discarded, and
/// consuming past the declared length is a protocol error.
fn finish_reply<R: Read>(buffer: &mut R, remaining: i64) -> Result<()> {
    if remaining < 0 {
        return Err(ResponseError(
            format!("reply payload ran {} bytes past its declared length", -remaining),
        ));
    }
    if remaining > 0 {
        let drained = io::copy(&mut buffer.by_ref().take(remaining as u64), &mut io::sink())?;
        if drained != remaining as u64 {
            return Err(ResponseError(
                "reply ended short of its declared length".to_owned(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;
    use std::io::Cursor;
    use wire_protocol::flags::{OpMsgFlags, OpQueryFlags, OpReplyFlags};
    use wire_protocol::header::{Header, OpCode};

    fn encode(doc: &bson::Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        bson::encode_document(&mut bytes, doc).unwrap();
        bytes
    }

    #[test]
    fn query_byte_layout() {
        let query = doc! { "a": 1 };
        let message = Message::with_query(
            7,
            OpQueryFlags::empty(),
            "test.coll".to_owned(),
            0,
            -1,
            query.clone(),
            None,
        ).unwrap();

        let mut bytes = Vec::new();
        message.write(&mut bytes).unwrap();

        let doc_bytes = encode(&query);
        let expected_length = 16 + 4 + 10 + 4 + 4 + doc_bytes.len();
        assert_eq!(bytes.len(), expected_length);
        // Header: total length, request id, responseTo, opcode 2004.
        assert_eq!(LittleEndian::read_i32(&bytes[0..4]), expected_length as i32);
        assert_eq!(LittleEndian::read_i32(&bytes[4..8]), 7);
        assert_eq!(LittleEndian::read_i32(&bytes[8..12]), 0);
        assert_eq!(LittleEndian::read_i32(&bytes[12..16]), 2004);
        // Flags, then the null-terminated namespace.
        assert_eq!(LittleEndian::read_i32(&bytes[16..20]), 0);
        assert_eq!(&bytes[20..30], b"test.coll\0");
        // numberToSkip and numberToReturn.
        assert_eq!(LittleEndian::read_i32(&bytes[30..34]), 0);
        assert_eq!(LittleEndian::read_i32(&bytes[34..38]), -1);
        assert_eq!(&bytes[38..], &doc_bytes[..]);
    }

    #[test]
    fn kill_cursors_byte_layout() {
        let message = Message::with_kill_cursors(3, vec![99, -2]);
        let mut bytes = Vec::new();
        message.write(&mut bytes).unwrap();

        assert_eq!(bytes.len(), 40);
        assert_eq!(LittleEndian::read_i32(&bytes[0..4]), 40);
        assert_eq!(LittleEndian::read_i32(&bytes[12..16]), 2007);
        assert_eq!(LittleEndian::read_i32(&bytes[16..20]), 0);
        assert_eq!(LittleEndian::read_i32(&bytes[20..24]), 2);
        assert_eq!(LittleEndian::read_i64(&bytes[24..32]), 99);
        assert_eq!(LittleEndian::read_i64(&bytes[32..40]), -2);
    }

    #[test]
    fn get_more_byte_layout() {
        let message = Message::with_get_more(5, "db.c".to_owned(), 10, 77);
        let mut bytes = Vec::new();
        message.write(&mut bytes).unwrap();

        assert_eq!(bytes.len(), 41);
        assert_eq!(LittleEndian::read_i32(&bytes[0..4]), 41);
        assert_eq!(LittleEndian::read_i32(&bytes[12..16]), 2005);
        assert_eq!(&bytes[20..25], b"db.c\0");
        assert_eq!(LittleEndian::read_i32(&bytes[25..29]), 10);
        assert_eq!(LittleEndian::read_i64(&bytes[29..37]), 77);
    }

    #[test]
    fn reply_round_trip() {
        let doc1 = doc! { "foo": 42.0 };
        let doc2 = doc! { "bar": "baz" };
        let payload: Vec<u8> = encode(&doc1).into_iter().chain(encode(&doc2)).collect();

        let mut bytes = Vec::new();
        let header = Header::new(16 + 20 + payload.len() as i32, 900, 7, OpCode::Reply);
        header.write(&mut bytes).unwrap();
        bytes.write_i32::<LittleEndian>(8).unwrap(); // awaitCapable
        bytes.write_i64::<LittleEndian>(4242).unwrap();
        bytes.write_i32::<LittleEndian>(0).unwrap();
        bytes.write_i32::<LittleEndian>(2).unwrap();
        bytes.extend_from_slice(&payload);

        let message = Message::read(&mut Cursor::new(bytes)).unwrap();
        match message {
            Message::OpReply { flags, cursor_id, number_returned, documents, .. } => {
                assert!(flags.contains(OpReplyFlags::AWAIT_CAPABLE));
                assert_eq!(cursor_id, 4242);
                assert_eq!(number_returned, 2);
                assert_eq!(documents.len(), 2);
                assert_eq!(documents[0].get("foo"), Some(&Bson::FloatingPoint(42.0)));
                assert_eq!(documents[1].get("bar"), Some(&Bson::String("baz".to_owned())));
            }
            other => panic!("expected OpReply, got {:?}", other),
        }
    }

    #[test]
    fn reply_discards_unread_trailer() {
        let doc = doc! { "ok": 1 };
        let payload = encode(&doc);

        let mut bytes = Vec::new();
        // Declare four bytes more than the document occupies.
        let header = Header::new(16 + 20 + payload.len() as i32 + 4, 1, 1, OpCode::Reply);
        header.write(&mut bytes).unwrap();
        bytes.write_i32::<LittleEndian>(0).unwrap();
        bytes.write_i64::<LittleEndian>(0).unwrap();
        bytes.write_i32::<LittleEndian>(0).unwrap();
        bytes.write_i32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let message = Message::read(&mut Cursor::new(bytes)).unwrap();
        match message {
            Message::OpReply { documents, .. } => assert_eq!(documents.len(), 1),
            other => panic!("expected OpReply, got {:?}", other),
        }
    }

    #[test]
    fn reply_shorter_than_declared_fails() {
        let doc = doc! { "ok": 1 };
        let payload = encode(&doc);

        let mut bytes = Vec::new();
        // Declare eight bytes that will never arrive.
        let header = Header::new(16 + 20 + payload.len() as i32 + 8, 1, 1, OpCode::Reply);
        header.write(&mut bytes).unwrap();
        bytes.write_i32::<LittleEndian>(0).unwrap();
        bytes.write_i64::<LittleEndian>(0).unwrap();
        bytes.write_i32::<LittleEndian>(0).unwrap();
        bytes.write_i32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&payload);

        assert!(Message::read(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn msg_round_trip() {
        let command = doc! { "ping": 1, "$db": "admin" };
        let message = Message::with_msg(11, OpMsgFlags::empty(), command.clone()).unwrap();

        let mut bytes = Vec::new();
        message.write(&mut bytes).unwrap();
        assert_eq!(LittleEndian::read_i32(&bytes[12..16]), 2013);

        let parsed = Message::read(&mut Cursor::new(bytes)).unwrap();
        match parsed {
            Message::OpMsg { document, .. } => assert_eq!(document, command),
            other => panic!("expected OpMsg, got {:?}", other),
        }
    }

    #[test]
    fn short_and_long_documents_round_trip() {
        let large_value: String = ::std::iter::repeat('x').take(4 * SHORT_DOCUMENT_LENGTH).collect();
        let doc = doc! { "filler": large_value };
        let payload = encode(&doc);
        assert!(payload.len() > SHORT_DOCUMENT_LENGTH);

        let mut bytes = Vec::new();
        let header = Header::new(16 + 20 + payload.len() as i32, 1, 1, OpCode::Reply);
        header.write(&mut bytes).unwrap();
        bytes.write_i32::<LittleEndian>(0).unwrap();
        bytes.write_i64::<LittleEndian>(0).unwrap();
        bytes.write_i32::<LittleEndian>(0).unwrap();
        bytes.write_i32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&payload);

        let message = Message::read(&mut Cursor::new(bytes)).unwrap();
        match message {
            Message::OpReply { documents, .. } => assert_eq!(documents[0], doc),
            other => panic!("expected OpReply, got {:?}", other),
        }
    }
}
