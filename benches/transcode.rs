use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mailjot::joplin::DryRunStore;
use mailjot::model::message::{Disposition, Message, Part};
use mailjot::transcode::sink::Sink;
use mailjot::transcode::Transcoder;

/// An HTML newsletter with `count` inline images and as many attachments.
fn synthetic_message(count: usize) -> Message {
    let mut html = String::from("<html><body><h1>Newsletter</h1>");
    let mut related = Vec::new();
    let mut mixed = Vec::new();

    for i in 0..count {
        html.push_str(&format!(
            "<p>Item <b>{i}</b>, see <a href=\"https://example.com/{i}\">details</a>.</p>\
             <p><img src=\"cid:img{i}@example\" alt=\"item {i}\"></p>"
        ));
        related.push(
            Part::leaf("image/png", vec![i as u8; 4096])
                .with_disposition(Disposition::Inline)
                .with_content_id(format!("img{i}@example"))
                .with_filename(format!("img{i}.png")),
        );
        mixed.push(
            Part::leaf("application/pdf", vec![0u8; 8192])
                .with_disposition(Disposition::Attachment)
                .with_filename(format!("doc{i}.pdf")),
        );
    }
    html.push_str("</body></html>");

    related.insert(0, Part::leaf("text/html", html));
    mixed.insert(0, Part::container("multipart/related", related));

    Message {
        subject: Some("=?UTF-8?Q?Weekly_newsletter?=".to_string()),
        root: Part::container("multipart/mixed", mixed),
        ..Message::default()
    }
}

fn bench_transcode_synthetic(c: &mut Criterion) {
    let message = synthetic_message(50);
    let sink = Sink::new(DryRunStore);

    c.bench_function("transcode_synthetic_50", |b| {
        b.iter(|| Transcoder::new(&sink).transcode(&message))
    });
}

fn bench_parse_and_transcode(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("related.eml");
    let raw = std::fs::read(fixture_path).unwrap();
    let sink = Sink::new(DryRunStore);

    c.bench_function("parse_and_transcode_related", |b| {
        b.iter(|| {
            let message = mailjot::parser::mime::parse_message(&raw).unwrap();
            Transcoder::new(&sink).transcode(&message)
        })
    });
}

criterion_group!(benches, bench_transcode_synthetic, bench_parse_and_transcode);
criterion_main!(benches);
