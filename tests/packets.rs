mod common;

use common::*;
use mysql_wire::constant::MAX_PACKET_SIZE;
use mysql_wire::{Conn, Error};

#[test]
fn oversized_command_splits_into_two_packets() {
    // Payload of MAX_PACKET_SIZE + 1 bytes (command byte + query text):
    // one full fragment with sequence 0, then a 1-byte fragment with
    // sequence 1.
    let sql_len = MAX_PACKET_SIZE; // payload = 1 command byte + sql
    let (port, server) = spawn_server(move |socket| {
        serve_handshake(socket);

        let (seq, len) = read_header(socket);
        assert_eq!((seq, len), (0, MAX_PACKET_SIZE));
        discard(socket, len);
        let (seq, len) = read_header(socket);
        assert_eq!((seq, len), (1, 1));
        discard(socket, len);

        // Reply sequence continues after the client's two fragments.
        write_packet(socket, 2, &ok_payload(0, 0, 2));
    });

    let mut conn = Conn::connect(opts(port)).expect("connect");
    let sql = "x".repeat(sql_len);
    conn.exec(&sql).expect("oversized exec");
    drop(conn);
    server.join().unwrap();
}

#[test]
fn exact_multiple_gets_empty_trailer() {
    // Payload of exactly MAX_PACKET_SIZE bytes must be terminated by an
    // empty packet.
    let sql_len = MAX_PACKET_SIZE - 1;
    let (port, server) = spawn_server(move |socket| {
        serve_handshake(socket);

        let (seq, len) = read_header(socket);
        assert_eq!((seq, len), (0, MAX_PACKET_SIZE));
        discard(socket, len);
        let (seq, len) = read_header(socket);
        assert_eq!((seq, len), (1, 0));

        write_packet(socket, 2, &ok_payload(0, 0, 2));
    });

    let mut conn = Conn::connect(opts(port)).expect("connect");
    let sql = "y".repeat(sql_len);
    conn.exec(&sql).expect("exact-multiple exec");
    drop(conn);
    server.join().unwrap();
}

#[test]
fn split_reply_is_reassembled() {
    // A row spanning two physical packets decodes as one logical packet.
    let big_len = MAX_PACKET_SIZE + 10;
    let (port, server) = spawn_server(move |socket| {
        serve_handshake(socket);

        let (seq, _) = read_packet(socket);
        assert_eq!(seq, 0);

        write_packet(socket, 1, &[0x01]); // one column
        write_packet(socket, 2, &column_payload("t", "blob", 0xFC, 0));
        write_packet(socket, 3, &eof_payload(2));

        // Row payload: lenenc length prefix + big_len bytes of 'z'.
        let mut row = Vec::with_capacity(big_len + 4);
        lenenc(&mut row, big_len as u64);
        row.resize(row.len() + big_len, b'z');

        write_packet(socket, 4, &row[..MAX_PACKET_SIZE]);
        write_packet(socket, 5, &row[MAX_PACKET_SIZE..]);
        write_packet(socket, 6, &eof_payload(2));
    });

    let mut conn = Conn::connect(opts(port)).expect("connect");
    let mut rows = conn.query("SELECT blob FROM t").expect("query");
    let row = rows.next_row().expect("row").expect("one row");
    let bytes = row[0].as_bytes().expect("bytes value");
    assert_eq!(bytes.len(), big_len);
    assert!(bytes.iter().all(|&b| b == b'z'));
    assert!(rows.next_row().expect("eof").is_none());
    rows.close().unwrap();
    drop(conn);
    server.join().unwrap();
}

#[test]
fn packet_too_large_leaves_connection_usable() {
    let (port, server) = spawn_server(|socket| {
        serve_handshake(socket);

        // Nothing arrives for the oversized attempt; the next command is
        // the ping.
        let (seq, payload) = read_packet(socket);
        assert_eq!(seq, 0);
        assert_eq!(payload, [0x0E]);
        write_packet(socket, 1, &ok_payload(0, 0, 2));
    });

    let mut opts = opts(port);
    opts.max_allowed_packet = 1024;
    let mut conn = Conn::connect(opts).expect("connect");

    let err = conn.exec(&"q".repeat(2048)).unwrap_err();
    assert!(matches!(err, Error::PktTooLarge));
    assert!(!conn.is_broken());

    conn.ping().expect("ping after too-large error");
    drop(conn);
    server.join().unwrap();
}

#[test]
fn sequence_behind_desyncs_connection() {
    let (port, server) = spawn_server(|socket| {
        serve_handshake(socket);
        let (seq, _) = read_packet(socket);
        assert_eq!(seq, 0);
        // Expected reply sequence is 1; send 0.
        write_packet(socket, 0, &ok_payload(0, 0, 2));
    });

    let mut conn = Conn::connect(opts(port)).expect("connect");
    let err = conn.exec("SELECT 1").unwrap_err();
    assert!(matches!(err, Error::PktSync));
    assert!(conn.is_broken());
    assert!(matches!(conn.ping().unwrap_err(), Error::InvalidConn));
    drop(conn);
    server.join().unwrap();
}

#[test]
fn sequence_ahead_desyncs_connection() {
    let (port, server) = spawn_server(|socket| {
        serve_handshake(socket);
        let (seq, _) = read_packet(socket);
        assert_eq!(seq, 0);
        // Expected reply sequence is 1; send 2 as if a packet was lost.
        write_packet(socket, 2, &ok_payload(0, 0, 2));
    });

    let mut conn = Conn::connect(opts(port)).expect("connect");
    let err = conn.exec("SELECT 1").unwrap_err();
    assert!(matches!(err, Error::PktSyncMul));
    assert!(conn.is_broken());
    drop(conn);
    server.join().unwrap();
}

#[test]
fn malformed_empty_packet_breaks_connection() {
    let (port, server) = spawn_server(|socket| {
        serve_handshake(socket);
        let (seq, _) = read_packet(socket);
        assert_eq!(seq, 0);
        // Zero-length packet with no preceding full-size packet.
        write_packet(socket, 1, &[]);
    });

    let mut conn = Conn::connect(opts(port)).expect("connect");
    let err = conn.exec("SELECT 1").unwrap_err();
    assert!(matches!(err, Error::InvalidConn));
    assert!(conn.is_broken());
    drop(conn);
    server.join().unwrap();
}

#[test]
fn server_error_passes_through() {
    let (port, server) = spawn_server(|socket| {
        serve_handshake(socket);
        let (_, _) = read_packet(socket);
        write_packet(socket, 1, &err_payload(1146, "42S02", "Table 'x' doesn't exist"));

        // Still usable afterwards.
        let (seq, payload) = read_packet(socket);
        assert_eq!(seq, 0);
        assert_eq!(payload, [0x0E]);
        write_packet(socket, 1, &ok_payload(0, 0, 2));
    });

    let mut conn = Conn::connect(opts(port)).expect("connect");
    match conn.exec("SELECT * FROM x").unwrap_err() {
        Error::Server(e) => {
            assert_eq!(e.number, 1146);
            assert_eq!(e.sql_state, "42S02");
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert!(!conn.is_broken());
    conn.ping().expect("ping after server error");
    drop(conn);
    server.join().unwrap();
}

#[test]
fn reject_read_only_breaks_connection() {
    let (port, server) = spawn_server(|socket| {
        serve_handshake(socket);
        let (_, _) = read_packet(socket);
        write_packet(
            socket,
            1,
            &err_payload(1792, "25006", "Cannot execute statement in a READ ONLY transaction"),
        );
    });

    let mut opts = opts(port);
    opts.reject_read_only = true;
    let mut conn = Conn::connect(opts).expect("connect");
    let err = conn.exec("INSERT INTO t VALUES (1)").unwrap_err();
    assert!(matches!(err, Error::InvalidConn));
    assert!(conn.is_broken());
    drop(conn);
    server.join().unwrap();
}
