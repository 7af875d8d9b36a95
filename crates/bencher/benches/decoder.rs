use std::hint::black_box;

use bencher::{Fixture, Framing};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use http::Method;
use micro_client_wire::codec::ResponseDecoder;
use micro_client_wire::protocol::{Message, PayloadItem};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static FIXTURES: [Fixture; 3] = [
    Fixture::new("no_content", "no_content.txt", Framing::NoBody, include_str!("../resources/response/no_content.txt")),
    Fixture::new("json_small", "json_small.txt", Framing::ContentLength, include_str!("../resources/response/json_small.txt")),
    Fixture::new("chunked_large", "chunked_large.txt", Framing::Chunked, include_str!("../resources/response/chunked_large.txt")),
];

/// Decodes one whole response, returning the number of body bytes.
fn decode_response(decoder: &mut ResponseDecoder, bytes: &mut BytesMut) -> usize {
    let mut body_size = 0;
    loop {
        match decoder.decode(bytes).expect("fixture should be a valid response") {
            Some(Message::Header(header)) => {
                black_box(header);
            }
            Some(Message::Payload(PayloadItem::Chunk(chunk))) => body_size += chunk.len(),
            Some(Message::Payload(PayloadItem::Eof)) => return body_size,
            None => panic!("fixture should be a complete response"),
        }
    }
}

fn benchmark_response_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("response_decoder");

    for fixture in &FIXTURES {
        group.throughput(Throughput::Bytes(fixture.len() as u64));
        group.bench_with_input(BenchmarkId::new(fixture.name(), format!("{:?}", fixture.framing())), fixture, |b, fixture| {
            b.iter_batched_ref(
                || (ResponseDecoder::new(&Method::GET), BytesMut::from(fixture.content())),
                |(decoder, bytes)| black_box(decode_response(decoder, bytes)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_response_decoder);
criterion_main!(decoder);
