use criterion::{Criterion, black_box, criterion_group, criterion_main};
use cssfill::css::{CssParser, Keywords, RuleFilter};

const FIXTURE: &str = "\
    @charset \"utf-8\";\n\
    body { margin: 0; font-family: system-ui, sans-serif; }\n\
    .nav a:local-link { font-weight: bold; }\n\
    @media (min-width: 40em) {\n\
      .sidebar { position: sticky; top: calc(1rem + (2px * 3)); }\n\
      @media (max-width: 1000px) { .sidebar { position: static; } }\n\
    }\n\
    @supports (display: grid) { .grid { display: grid; } }\n\
    @keyframes pulse { from { opacity: 0.4; } to { opacity: 1; } }\n\
    .hero { background-image: url(data:image/png;base64,iVBORw0KGgo=); }\n";

fn benchmark_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");

    group.bench_function("parse_fixture", |b| {
        let parser = CssParser::new();
        b.iter(|| parser.parse(black_box(FIXTURE), None))
    });

    group.bench_function("parse_cached", |b| {
        let parser = CssParser::new();
        parser.parse(FIXTURE, Some("fixture"));
        b.iter(|| parser.parse(black_box(FIXTURE), Some("fixture")))
    });

    group.finish();
}

fn benchmark_filtering(c: &mut Criterion) {
    let parser = CssParser::new();
    let tree = parser.parse(FIXTURE, None);
    let filter = RuleFilter::new(&Keywords {
        selectors: vec![":local-link".to_string()],
        declarations: vec!["position:sticky".to_string()],
    });

    c.bench_function("filter_fixture", |b| {
        b.iter(|| filter.filter(black_box(&tree)))
    });
}

criterion_group!(benches, benchmark_parsing, benchmark_filtering);
criterion_main!(benches);
