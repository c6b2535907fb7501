// Unit tests for the framed channel codec.
// The framing invariants here are the foundation the whole wire protocol
// stands on; see the integration tests for the full socket path.

use crate::codec::{LineDecoder, encode_line};

use models::BridgeMessage;

fn log_message(text: &str) -> BridgeMessage {
    BridgeMessage::Log {
        message: text.to_string(),
    }
}

/// **VALUE**: Verifies the partial-line durability property: bytes arriving
/// split across reads produce exactly one message, never two.
///
/// **WHY THIS MATTERS**: TCP is a byte stream. At 60fps device-state volume,
/// reads ending mid-line are the common case, not the exception. If the
/// decoder emits or drops the partial tail, the host sees corrupted or
/// missing device state.
///
/// **BUG THIS CATCHES**: Would catch a decoder that flushes its buffer on
/// every feed instead of holding the unterminated remainder.
#[test]
fn given_line_split_across_chunks_when_fed_then_yields_single_joined_line() {
    // GIVEN: A decoder fed "abc" with no terminator
    let mut decoder = LineDecoder::new();
    let first = decoder.feed(b"abc");

    // THEN: Nothing is emitted yet
    assert!(first.is_empty(), "No line should be emitted before newline");
    assert!(decoder.has_partial(), "Partial tail should be buffered");

    // WHEN: The rest of the line arrives
    let second = decoder.feed(b"def\n");

    // THEN: Exactly one line, joined from both chunks
    assert_eq!(second, vec!["abcdef".to_string()]);
    assert!(!decoder.has_partial(), "Buffer should be drained");
}

/// **VALUE**: Verifies chunk-split equivalence: any split of a byte stream
/// yields the same lines, in the same order, as feeding it whole.
///
/// **WHY THIS MATTERS**: The OS decides read boundaries, not us. Framing
/// must be a pure function of the byte stream.
///
/// **BUG THIS CATCHES**: Would catch off-by-one terminator handling that
/// only shows up when the newline lands exactly on a chunk boundary.
#[test]
fn given_every_split_point_when_fed_incrementally_then_lines_match_whole_feed() {
    let stream = b"first\nsecond line\nthird\n";

    // GIVEN: The lines produced by feeding everything at once
    let mut whole = LineDecoder::new();
    let expected = whole.feed(stream);
    assert_eq!(expected.len(), 3);

    // WHEN/THEN: Every two-chunk split produces the identical sequence
    for split in 0..=stream.len() {
        let mut decoder = LineDecoder::new();
        let mut lines = decoder.feed(&stream[..split]);
        lines.extend(decoder.feed(&stream[split..]));
        assert_eq!(lines, expected, "Mismatch at split point {split}");
    }

    // THEN: Byte-by-byte feeding matches too
    let mut trickle = LineDecoder::new();
    let mut lines = Vec::new();
    for byte in stream {
        lines.extend(trickle.feed(&[*byte]));
    }
    assert_eq!(lines, expected);
}

/// A single chunk carrying several complete lines drains them all, in
/// arrival order.
#[test]
fn given_multiple_lines_in_one_chunk_then_all_emitted_in_order() {
    let mut decoder = LineDecoder::new();

    let lines = decoder.feed(b"one\ntwo\nthree\npartial");

    assert_eq!(
        lines,
        vec!["one".to_string(), "two".to_string(), "three".to_string()]
    );
    assert!(decoder.has_partial(), "\"partial\" should stay buffered");
}

/// **VALUE**: Verifies empty lines (post-trim) are skipped silently rather
/// than surfaced as protocol errors.
///
/// **BUG THIS CATCHES**: Would catch a decoder handing "" to the protocol
/// layer, which would log a malformed-line warning for every keep-alive
/// blank a peer might emit.
#[test]
fn given_blank_and_whitespace_lines_then_skipped_silently() {
    let mut decoder = LineDecoder::new();

    let lines = decoder.feed(b"\n   \n\t\nreal\n");

    assert_eq!(lines, vec!["real".to_string()]);
}

/// Trailing whitespace (e.g. a peer emitting \r\n) is trimmed off the
/// emitted line.
#[test]
fn given_crlf_terminated_line_then_carriage_return_is_trimmed() {
    let mut decoder = LineDecoder::new();

    let lines = decoder.feed(b"hello\r\n");

    assert_eq!(lines, vec!["hello".to_string()]);
}

/// Invalid UTF-8 inside a line is replaced lossily instead of killing the
/// stream; later lines are unaffected.
#[test]
fn given_invalid_utf8_line_then_replaced_lossily_and_stream_continues() {
    let mut decoder = LineDecoder::new();

    let lines = decoder.feed(b"bad\xff\xfebytes\nclean\n");

    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains('\u{FFFD}'), "Bad bytes should be replaced");
    assert_eq!(lines[1], "clean");
}

/// **VALUE**: Verifies `encode_line` output is exactly one terminated line
/// that the decoder hands back intact.
///
/// **BUG THIS CATCHES**: Would catch an encoder that forgets the terminator
/// or emits more than one, desynchronizing the peer's framing.
#[test]
fn given_encoded_message_when_decoded_then_round_trips_as_one_line() {
    // GIVEN: An encoded log message
    let encoded = encode_line(&log_message("status update")).unwrap();

    // THEN: Exactly one terminator, at the end
    assert_eq!(
        encoded.iter().filter(|&&b| b == b'\n').count(),
        1,
        "Exactly one newline expected"
    );
    assert_eq!(*encoded.last().unwrap(), b'\n');

    // WHEN: Fed back through the decoder
    let mut decoder = LineDecoder::new();
    let lines = decoder.feed(&encoded);

    // THEN: One line, parseable back to the same message
    assert_eq!(lines.len(), 1);
    let parsed = crate::protocol::parse(&lines[0]).unwrap();
    assert_eq!(parsed, log_message("status update"));
}

/// **VALUE**: Verifies a newline inside a string field cannot break framing.
///
/// **WHY THIS MATTERS**: `log` messages carry arbitrary diagnostic text. An
/// embedded newline reaching the wire raw would split one message into two
/// and desynchronize every line after it.
///
/// **BUG THIS CATCHES**: Would catch a serializer change that stops escaping
/// control characters in strings.
#[test]
fn given_message_with_embedded_newline_then_still_one_wire_line() {
    let message = log_message("line one\nline two");

    let encoded = encode_line(&message).unwrap();

    // JSON string escaping turns the newline into \n, so exactly one raw
    // terminator remains.
    assert_eq!(encoded.iter().filter(|&&b| b == b'\n').count(), 1);

    let mut decoder = LineDecoder::new();
    let lines = decoder.feed(&encoded);
    assert_eq!(lines.len(), 1);

    let parsed = crate::protocol::parse(&lines[0]).unwrap();
    assert_eq!(parsed, message, "Embedded newline should survive the trip");
}
