use chat2api::error::RelayError;
use chat2api::protocol::{AiSdkDecoder, FrameDecoder, OpenAiDecoder, TokenDecoder};
use chat2api::stream::accumulator::Emission;
use chat2api::stream::{
    aggregate, DecodedEvent, DeltaAccumulator, FrameLexer, FramePrefix, StreamSession,
    UpstreamFrame,
};

/// Run raw upstream bytes, split at the given offsets, through the streaming
/// pipeline and return every emission in order.
fn stream_bytes(raw: &[u8], splits: &[usize], decoder: &dyn FrameDecoder) -> Vec<Emission> {
    let mut lexer = FrameLexer::new(FramePrefix::Data);
    let mut accumulator = DeltaAccumulator::new(StreamSession::new("chatcmpl-t", "m", 1));
    let mut out = Vec::new();

    let mut start = 0;
    for &end in splits.iter().chain(std::iter::once(&raw.len())) {
        for frame in lexer.feed(&raw[start..end]) {
            out.extend(accumulator.push(decoder.decode(&frame)));
        }
        start = end;
    }
    if let Some(frame) = lexer.flush() {
        out.extend(accumulator.push(decoder.decode(&frame)));
    }
    out.extend(accumulator.finish());
    out
}

fn aggregate_bytes(raw: &[u8], decoder: &dyn FrameDecoder) -> Result<String, RelayError> {
    let mut lexer = FrameLexer::new(FramePrefix::Data);
    let mut frames = lexer.feed(raw);
    frames.extend(lexer.flush());
    aggregate(frames, decoder)
}

fn contents(emissions: &[Emission]) -> Vec<String> {
    emissions
        .iter()
        .filter_map(|emission| match emission {
            Emission::Chunk(chunk) => chunk.content().map(str::to_owned),
            Emission::Done => None,
        })
        .collect()
}

fn terminal_reasons(emissions: &[Emission]) -> Vec<String> {
    emissions
        .iter()
        .filter_map(|emission| match emission {
            Emission::Chunk(chunk) => chunk.finish_reason().map(str::to_owned),
            Emission::Done => None,
        })
        .collect()
}

fn done_count(emissions: &[Emission]) -> usize {
    emissions
        .iter()
        .filter(|emission| matches!(emission, Emission::Done))
        .count()
}

const SCENARIO_ONE: &[u8] = b"data:{\"type\":\"token\",\"token\":\"Hel\"}\n\
data:{\"type\":\"token\",\"token\":\"lo\"}\n\
data:{\"type\":\"done\"}\n";

#[test]
fn token_frames_stream_and_aggregate_to_hello() {
    let emissions = stream_bytes(SCENARIO_ONE, &[], &TokenDecoder);
    assert_eq!(contents(&emissions), vec!["Hel", "lo"]);
    assert_eq!(terminal_reasons(&emissions), vec!["stop"]);
    assert_eq!(done_count(&emissions), 1);
    assert_eq!(emissions.last(), Some(&Emission::Done));

    assert_eq!(aggregate_bytes(SCENARIO_ONE, &TokenDecoder).unwrap(), "Hello");
}

#[test]
fn done_sentinel_alone_yields_only_terminal_sequence() {
    let raw = b"data:[DONE]\n";
    let emissions = stream_bytes(raw, &[], &TokenDecoder);
    assert!(contents(&emissions).is_empty());
    assert_eq!(terminal_reasons(&emissions), vec!["stop"]);
    assert_eq!(done_count(&emissions), 1);
    assert_eq!(emissions.len(), 2);

    assert_eq!(aggregate_bytes(raw, &TokenDecoder).unwrap(), "");
}

#[test]
fn garbage_line_between_tokens_is_ignored() {
    let raw = b"data:{\"type\":\"token\",\"token\":\"a\"}\n\
data:not-json\n\
data:{\"type\":\"token\",\"token\":\"b\"}\n";
    let emissions = stream_bytes(raw, &[], &TokenDecoder);
    assert_eq!(contents(&emissions), vec!["a", "b"]);
    assert_eq!(terminal_reasons(&emissions), vec!["stop"]);
    assert_eq!(aggregate_bytes(raw, &TokenDecoder).unwrap(), "ab");
}

#[test]
fn upstream_error_frame_is_inlined_then_terminated() {
    let raw = b"data:{\"type\":\"token\",\"token\":\"partial\"}\n\
data:{\"type\":\"error\",\"message\":\"quota exceeded\"}\n\
data:{\"type\":\"token\",\"token\":\"late\"}\n";
    let emissions = stream_bytes(raw, &[], &TokenDecoder);
    let texts = contents(&emissions);
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0], "partial");
    assert!(texts[1].contains("quota exceeded"));
    assert_eq!(terminal_reasons(&emissions), vec!["stop"]);
    assert_eq!(done_count(&emissions), 1);

    let err = aggregate_bytes(raw, &TokenDecoder).unwrap_err();
    assert_eq!(err.status().as_u16(), 502);
    assert!(err.to_string().contains("quota exceeded"));
}

#[test]
fn multibyte_character_split_across_reads() {
    let raw = "data:{\"type\":\"text-delta\",\"delta\":\"caf\u{e9} \u{1f600}\"}\n".as_bytes();
    let e_acute = raw
        .windows(2)
        .position(|pair| pair == [0xC3, 0xA9])
        .unwrap();
    let emoji = raw.iter().position(|&b| b == 0xF0).unwrap();

    let emissions = stream_bytes(raw, &[e_acute + 1, emoji + 2], &AiSdkDecoder);
    assert_eq!(contents(&emissions), vec!["caf\u{e9} \u{1f600}"]);
    assert!(!contents(&emissions)[0].contains('\u{fffd}'));
}

#[test]
fn chunk_boundaries_never_change_output() {
    let raw = b"data: {\"type\":\"text-delta\",\"delta\":\"one \"}\r\n\
\r\n\
data: {\"type\":\"text-delta\",\"delta\":\"two \"}\n\
: keep-alive comment\n\
data: {\"type\":\"text-delta\",\"delta\":\"three\"}\n\
data: {\"type\":\"finish\",\"finishReason\":\"length\"}\n";
    let whole = stream_bytes(raw, &[], &AiSdkDecoder);

    for split in 1..raw.len() {
        assert_eq!(
            stream_bytes(raw, &[split], &AiSdkDecoder),
            whole,
            "split at {split}"
        );
    }
    let every_byte: Vec<usize> = (1..raw.len()).collect();
    assert_eq!(stream_bytes(raw, &every_byte, &AiSdkDecoder), whole);
    assert_eq!(terminal_reasons(&whole), vec!["length"]);
}

#[test]
fn repeated_terminal_events_emit_one_terminal_and_one_done() {
    let mut accumulator = DeltaAccumulator::new(StreamSession::new("id", "m", 1));
    let mut emissions = Vec::new();
    for event in [
        DecodedEvent::TextDelta { text: "x".into() },
        DecodedEvent::Finish { reason: None },
        DecodedEvent::ErrorEvent {
            message: "after finish".into(),
        },
        DecodedEvent::Finish {
            reason: Some("length".into()),
        },
    ] {
        emissions.extend(accumulator.push(event));
    }
    emissions.extend(accumulator.finish());
    emissions.extend(accumulator.fail("late failure"));

    assert_eq!(terminal_reasons(&emissions), vec!["stop"]);
    assert_eq!(done_count(&emissions), 1);
    assert_eq!(contents(&emissions), vec!["x"]);
}

#[test]
fn terminal_chunk_follows_every_preceding_delta() {
    let texts: Vec<String> = (0..50).map(|i| format!("t{i} ")).collect();
    let mut accumulator = DeltaAccumulator::new(StreamSession::new("id", "m", 1));
    let mut emissions = Vec::new();
    for text in &texts {
        emissions.extend(accumulator.push(DecodedEvent::TextDelta { text: text.clone() }));
    }
    emissions.extend(accumulator.push(DecodedEvent::Finish { reason: None }));

    assert_eq!(contents(&emissions).concat(), texts.concat());
    let terminal_index = emissions
        .iter()
        .position(|emission| matches!(emission, Emission::Chunk(chunk) if chunk.is_terminal()))
        .unwrap();
    assert_eq!(terminal_index, texts.len());
    assert_eq!(emissions.len(), texts.len() + 2);
}

#[test]
fn streamed_and_aggregated_text_agree() {
    let raw = b"data: {\"type\":\"start\"}\n\
data: {\"type\":\"text-delta\",\"delta\":\"Rust \"}\n\
data: garbage\n\
data: {\"type\":\"text-delta\",\"textDelta\":\"is \"}\n\
data: {\"type\":\"text-delta\",\"delta\":\"\xF0\x9F\xA6\x80\"}\n\
data: {\"type\":\"finish\"}\n\
data: [DONE]\n";
    let streamed = contents(&stream_bytes(raw, &[7, 40, 41], &AiSdkDecoder)).concat();
    let aggregated = aggregate_bytes(raw, &AiSdkDecoder).unwrap();
    assert_eq!(streamed, "Rust is \u{1f980}");
    assert_eq!(streamed, aggregated);
}

#[test]
fn complete_after_deltas_streams_only_the_remainder() {
    let raw = b"data:{\"type\":\"token\",\"token\":\"draft\"}\n\
data:{\"type\":\"complete\",\"text\":\"draft final\"}\n\
data:{\"type\":\"done\"}\n";
    let emissions = stream_bytes(raw, &[], &TokenDecoder);
    assert_eq!(contents(&emissions), vec!["draft", " final"]);
    assert_eq!(
        contents(&emissions).concat(),
        aggregate_bytes(raw, &TokenDecoder).unwrap()
    );
}

#[test]
fn divergent_complete_cannot_retract_streamed_text() {
    let raw = b"data:{\"type\":\"token\",\"token\":\"draft\"}\n\
data:{\"type\":\"complete\",\"text\":\"final answer\"}\n";
    let emissions = stream_bytes(raw, &[], &TokenDecoder);
    assert_eq!(contents(&emissions), vec!["draft"]);
    assert_eq!(terminal_reasons(&emissions), vec!["stop"]);
    assert_eq!(aggregate_bytes(raw, &TokenDecoder).unwrap(), "final answer");
}

#[test]
fn openai_finish_reason_on_content_frame_is_preserved() {
    let raw = b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"trun\"},\"finish_reason\":null}]}\n\n\
data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"cated\"},\"finish_reason\":\"length\"}]}\n\n\
data: [DONE]\n\n";
    let emissions = stream_bytes(raw, &[], &OpenAiDecoder);
    assert_eq!(contents(&emissions), vec!["trun", "cated"]);
    assert_eq!(terminal_reasons(&emissions), vec!["length"]);
    assert_eq!(done_count(&emissions), 1);
    assert_eq!(aggregate_bytes(raw, &OpenAiDecoder).unwrap(), "truncated");
}

#[test]
fn sse_records_are_well_formed() {
    let emissions = stream_bytes(SCENARIO_ONE, &[], &TokenDecoder);
    let records: Vec<String> = emissions.iter().map(Emission::to_sse).collect();
    for record in &records {
        assert!(record.starts_with("data: "));
        assert!(record.ends_with("\n\n"));
    }
    assert_eq!(records.last().map(String::as_str), Some("data: [DONE]\n\n"));

    let first: serde_json::Value =
        serde_json::from_str(records[0].trim_start_matches("data: ").trim_end()).unwrap();
    assert_eq!(first["object"], "chat.completion.chunk");
    assert_eq!(first["id"], "chatcmpl-t");
    assert_eq!(first["choices"][0]["delta"]["content"], "Hel");
    assert!(first["choices"][0]["finish_reason"].is_null());

    let terminal: serde_json::Value =
        serde_json::from_str(records[2].trim_start_matches("data: ").trim_end()).unwrap();
    assert_eq!(terminal["choices"][0]["finish_reason"], "stop");
    assert_eq!(terminal["choices"][0]["delta"], serde_json::json!({}));
}

#[test]
fn unprefixed_lines_are_frames_in_ndjson_mode() {
    let mut lexer = FrameLexer::new(FramePrefix::None);
    let frames = lexer.feed(b"{\"token\":\"a\"}\n\n{\"token\":\"b\"}\n{\"type\":\"done\"}");
    assert_eq!(
        frames,
        vec![
            UpstreamFrame::new("{\"token\":\"a\"}"),
            UpstreamFrame::new("{\"token\":\"b\"}")
        ]
    );
    let tail = lexer.flush().unwrap();
    assert_eq!(
        TokenDecoder.decode(&tail),
        DecodedEvent::Finish { reason: None }
    );
}
