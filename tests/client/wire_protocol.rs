use bson;
use byteorder::{ByteOrder, LittleEndian};
use mongo_driver::wire_protocol::flags::{OpMsgFlags, OpQueryFlags};
use mongo_driver::wire_protocol::header::{Header, OpCode};
use mongo_driver::wire_protocol::operations::Message;
use std::io::Cursor;

#[test]
fn query_message_is_byte_exact() {
    let message = Message::with_query(
        1,
        OpQueryFlags::empty(),
        "test.$cmd".to_owned(),
        0,
        -1,
        doc! { "isMaster": 1 },
        None,
    ).unwrap();

    let mut bytes = Vec::new();
    message.write(&mut bytes).unwrap();

    assert_eq!(LittleEndian::read_i32(&bytes[0..4]) as usize, bytes.len());
    assert_eq!(LittleEndian::read_i32(&bytes[4..8]), 1);
    assert_eq!(LittleEndian::read_i32(&bytes[12..16]), 2004);
    assert_eq!(&bytes[20..30], b"test.$cmd\0");
}

#[test]
fn reply_messages_parse_back() {
    let body = doc! { "ok": 1, "ismaster": true };
    let mut payload = Vec::new();
    bson::encode_document(&mut payload, &body).unwrap();

    let mut bytes = Vec::new();
    Header::new(16 + 20 + payload.len() as i32, 7, 1, OpCode::Reply)
        .write(&mut bytes)
        .unwrap();
    bytes.extend_from_slice(&[0u8; 4]); // flags
    bytes.extend_from_slice(&[0u8; 8]); // cursor id
    bytes.extend_from_slice(&[0u8; 4]); // starting from
    bytes.extend_from_slice(&[1, 0, 0, 0]); // number returned
    bytes.extend_from_slice(&payload);

    match Message::read(&mut Cursor::new(bytes)).unwrap() {
        Message::OpReply { header, documents, .. } => {
            assert_eq!(header.response_to, 1);
            assert_eq!(documents, vec![body]);
        }
        other => panic!("expected OpReply, got {:?}", other),
    }
}

#[test]
fn msg_command_round_trips() {
    let command = doc! { "find": "widgets", "filter": {}, "$db": "test" };
    let message = Message::with_msg(9, OpMsgFlags::empty(), command.clone()).unwrap();

    let mut bytes = Vec::new();
    message.write(&mut bytes).unwrap();
    assert_eq!(LittleEndian::read_i32(&bytes[12..16]), 2013);
    assert_eq!(bytes[20], 0); // single body section

    match Message::read(&mut Cursor::new(bytes)).unwrap() {
        Message::OpMsg { document, .. } => assert_eq!(document, command),
        other => panic!("expected OpMsg, got {:?}", other),
    }
}
