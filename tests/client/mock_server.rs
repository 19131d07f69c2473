//! Tests against an in-process mock server speaking just enough of the wire
//! protocol to answer a scripted sequence of requests.
use bson::{self, Bson};
use byteorder::{ByteOrder, LittleEndian};
use env_logger;
use mongo_driver::{Client, Error, ThreadedClient};
use mongo_driver::db::ThreadedDatabase;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

fn is_master_reply(max_wire_version: i32) -> bson::Document {
    doc! {
        "ismaster": true,
        "minWireVersion": 0,
        "maxWireVersion": max_wire_version,
        "ok": 1
    }
}

// Reads one client message, returning its request id. The body is discarded.
fn read_request(stream: &mut TcpStream) -> ::std::io::Result<i32> {
    let mut header = [0u8; 16];
    stream.read_exact(&mut header)?;
    let length = LittleEndian::read_i32(&header[0..4]);
    let request_id = LittleEndian::read_i32(&header[4..8]);
    let mut body = vec![0u8; (length - 16) as usize];
    stream.read_exact(&mut body)?;
    Ok(request_id)
}

// Writes an OP_REPLY carrying a single document.
fn write_reply(stream: &mut TcpStream, response_to: i32, doc: &bson::Document) {
    let mut payload = Vec::new();
    bson::encode_document(&mut payload, doc).unwrap();

    let mut message = Vec::new();
    let total = 16 + 20 + payload.len() as i32;
    let mut scratch = [0u8; 4];
    for value in &[total, 900, response_to, 1] {
        LittleEndian::write_i32(&mut scratch, *value);
        message.extend_from_slice(&scratch);
    }
    message.extend_from_slice(&[0u8; 4]); // flags
    message.extend_from_slice(&[0u8; 8]); // cursor id
    message.extend_from_slice(&[0u8; 4]); // starting from
    LittleEndian::write_i32(&mut scratch, 1);
    message.extend_from_slice(&scratch); // number returned
    message.extend_from_slice(&payload);

    stream.write_all(&message).unwrap();
}

// Serves the scripted replies in order, one per client request, then drains
// fire-and-forget traffic until the client hangs up.
fn serve(replies: Vec<bson::Document>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        for reply in &replies {
            let request_id = match read_request(&mut stream) {
                Ok(id) => id,
                Err(_) => return,
            };
            write_reply(&mut stream, request_id, reply);
        }
        while read_request(&mut stream).is_ok() {}
    });

    (port, handle)
}

#[test]
fn handshake_and_find_round_trip() {
    let _ = env_logger::try_init();

    let find_reply = doc! {
        "ok": 1,
        "cursor": {
            "id": 0i64,
            "ns": "test.widgets",
            "firstBatch": [
                { "_id": 1, "name": "bolt" },
                { "_id": 2, "name": "nut" }
            ]
        }
    };
    let (port, handle) = serve(vec![is_master_reply(5), find_reply]);

    let client = Client::connect("127.0.0.1", port).unwrap();
    let coll = client.get_collection("test.widgets").unwrap();

    let docs: Vec<bson::Document> = coll.find(None, None)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].get("name"), Some(&Bson::String("bolt".to_owned())));
    assert_eq!(docs[1].get("_id"), Some(&Bson::I32(2)));

    drop(coll);
    drop(client);
    handle.join().unwrap();
}

#[test]
fn cursor_pages_through_get_more() {
    let _ = env_logger::try_init();

    let find_reply = doc! {
        "ok": 1,
        "cursor": {
            "id": 55i64,
            "ns": "test.widgets",
            "firstBatch": [ { "n": 1 }, { "n": 2 } ]
        }
    };
    let get_more_reply = doc! {
        "ok": 1,
        "cursor": {
            "id": 0i64,
            "ns": "test.widgets",
            "nextBatch": [ { "n": 3 } ]
        }
    };
    let (port, handle) = serve(vec![is_master_reply(5), find_reply, get_more_reply]);

    let client = Client::connect("127.0.0.1", port).unwrap();
    let coll = client.get_collection("test.widgets").unwrap();

    let values: Vec<i64> = coll.find(None, None)
        .unwrap()
        .map(|doc| match doc.unwrap().get("n") {
            Some(&Bson::I32(n)) => i64::from(n),
            Some(&Bson::I64(n)) => n,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    assert_eq!(values, vec![1, 2, 3]);

    drop(coll);
    drop(client);
    handle.join().unwrap();
}

#[test]
fn insert_one_generates_an_object_id() {
    let _ = env_logger::try_init();

    let (port, handle) = serve(vec![is_master_reply(5), doc! { "ok": 1, "n": 1 }]);

    let client = Client::connect("127.0.0.1", port).unwrap();
    let coll = client.get_collection("test.widgets").unwrap();

    let result = coll.insert_one(doc! { "name": "bolt" }).unwrap();
    assert!(result.acknowledged);
    match result.inserted_id {
        Some(Bson::ObjectId(_)) => {}
        other => panic!("expected a generated ObjectId, got {:?}", other),
    }

    drop(coll);
    drop(client);
    handle.join().unwrap();
}

#[test]
fn command_errors_carry_server_details() {
    let _ = env_logger::try_init();

    let failure = doc! { "ok": 0, "errmsg": "not authorized on test", "code": 13 };
    let (port, handle) = serve(vec![is_master_reply(5), failure]);

    let client = Client::connect("127.0.0.1", port).unwrap();
    let err = client
        .db("test")
        .run_command_checked(doc! { "compact": "widgets" })
        .unwrap_err();
    match err {
        Error::CommandError(exception) => {
            assert_eq!(exception.code, 13);
            assert_eq!(exception.message, "not authorized on test");
        }
        other => panic!("expected CommandError, got {:?}", other),
    }

    drop(client);
    handle.join().unwrap();
}

#[test]
fn mismatched_reply_ids_fail_the_connection() {
    let _ = env_logger::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        if let Ok(request_id) = read_request(&mut stream) {
            // Answer some other request than the one that was made.
            write_reply(&mut stream, request_id + 7, &is_master_reply(5));
        }
        while read_request(&mut stream).is_ok() {}
    });

    let err = Client::connect("127.0.0.1", port).unwrap_err();
    match err {
        Error::ResponseError(_) => {}
        other => panic!("expected ResponseError, got {:?}", other),
    }
    handle.join().unwrap();
}

#[test]
fn unreachable_server_fails_fast() {
    // Port 1 is essentially never listening.
    assert!(Client::with_uri("mongodb://127.0.0.1:1/?connectTimeoutMS=300").is_err());
}
