use tracelink::transport::inbound::InboundBuffer;

#[test]
fn test_append_stops_at_capacity() {
    let buffer = InboundBuffer::new(1024);
    let chunk = vec![b'x'; 1024 * 1024];

    // 1. A flood far past the limit keeps only what fits
    let mut dropped = 0;
    for _ in 0..64 {
        dropped += buffer.append(&chunk);
    }
    assert_eq!(buffer.len(), 1024);
    assert_eq!(dropped, 64 * chunk.len() - 1024);

    // 2. The reader gets the retained prefix once
    assert_eq!(buffer.drain().map(|s| s.len()), Some(1024));
    assert!(buffer.is_empty());
}

#[test]
fn test_room_frees_after_drain() {
    let buffer = InboundBuffer::new(8);
    assert_eq!(buffer.append(b"step;resume;"), 4);
    assert_eq!(buffer.drain().as_deref(), Some("step;res"));

    assert_eq!(buffer.append(b"pause;"), 0);
    assert_eq!(buffer.drain().as_deref(), Some("pause;"));
}

#[test]
fn test_split_character_waits_for_its_tail() {
    let buffer = InboundBuffer::new(64);
    let bytes = "hé".as_bytes();

    buffer.append(&bytes[..2]);
    assert_eq!(buffer.drain().as_deref(), Some("h"));
    assert_eq!(buffer.drain(), None, "half a character is not handed out");

    buffer.append(&bytes[2..]);
    assert_eq!(buffer.drain().as_deref(), Some("é"));
}

#[test]
fn test_clear_discards_pending_text() {
    let buffer = InboundBuffer::new(16);
    buffer.append(b"left over");
    buffer.clear();
    assert_eq!(buffer.drain(), None);
    assert_eq!(buffer.capacity(), 16);
}
