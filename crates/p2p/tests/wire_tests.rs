//! Frame codec tests over in-memory streams.

use axiom_p2p::wire::{read_frame, write_frame};
use axiom_p2p::{Envelope, Error, HelloBody, Message, MAX_FRAME_LEN};
use axiom_types::{Block, Fact};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn frames_preserve_order_per_connection() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);

    let first = Envelope::new("fp", Message::Ping { ts: 1 });
    let second = Envelope::new(
        "fp",
        Message::Hello(HelloBody {
            pubkey: "PEM".into(),
            listen_addr: "127.0.0.1:7000".into(),
            chain_height: 4,
            stake: 25,
        }),
    );
    write_frame(&mut client, &first).await.unwrap();
    write_frame(&mut client, &second).await.unwrap();

    assert_eq!(read_frame(&mut server).await.unwrap(), first);
    assert_eq!(read_frame(&mut server).await.unwrap(), second);
}

#[tokio::test]
async fn block_announce_round_trips_a_full_block() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);
    let block = Block::build(
        3,
        Block::genesis().hash,
        vec![Fact::compute_hash("a"), Fact::compute_hash("b")],
        "cafe".repeat(16),
        1_700_000_000,
    );

    let envelope = Envelope::new("cafe".repeat(16), Message::BlockAnnounce(block.clone()));
    write_frame(&mut client, &envelope).await.unwrap();

    match read_frame(&mut server).await.unwrap().message {
        Message::BlockAnnounce(received) => assert_eq!(received, block),
        other => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn oversize_length_prefix_is_rejected() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    let declared = (MAX_FRAME_LEN + 1) as u32;
    client.write_all(&declared.to_be_bytes()).await.unwrap();

    match read_frame(&mut server).await {
        Err(Error::FrameTooLarge(len)) => assert_eq!(len, MAX_FRAME_LEN + 1),
        other => panic!("expected FrameTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_payload_is_a_protocol_error() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    let junk = b"this is not json";
    client
        .write_all(&(junk.len() as u32).to_be_bytes())
        .await
        .unwrap();
    client.write_all(junk).await.unwrap();

    assert!(matches!(
        read_frame(&mut server).await,
        Err(Error::Protocol(_))
    ));
}
