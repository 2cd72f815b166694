use std::fmt::Write as _;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use csv_intake::filter::{FilterSet, parse_filter};
use csv_intake::header::HeaderLayout;
use csv_intake::intake::{ImportSession, ReadOptions};
use csv_intake::view::{SortDirective, sort_records};

fn generate_register(rows: usize) -> String {
    let mut text = String::new();
    text.push_str("CITY CLINIC,,,,,,,,,,,,\nMonth: March,,,,,,,,,,,,\n");
    text.push_str("S. NO.,DATE,NAME,AGE,SEX,CONTACT,ADDRESS,DIAGNOSIS,DOCTOR,FOLLOW UP,,,\n");
    text.push_str(",,,,,,,,,,DrugA,DrugB,DrugC\n");
    for i in 0..rows {
        let sex = if i % 2 == 0 { "F" } else { "M" };
        let doctor = match i % 3 {
            0 => "Dr. Menon",
            1 => "Dr. Iyer",
            _ => "Dr. Rao",
        };
        let age = if i % 17 == 0 {
            "unknown".to_string()
        } else {
            (i % 90).to_string()
        };
        writeln!(
            text,
            "{i},01-03-2024,Patient {i},{age},{sex},98765{i:05},Street {i},Fever,{doctor},Yes,yes,no,"
        )
        .expect("row");
    }
    text
}

fn bench_filters(c: &mut Criterion) {
    let text = generate_register(20_000);
    let session = ImportSession::from_reader(
        text.as_bytes(),
        &HeaderLayout::default(),
        &ReadOptions::default(),
    )
    .expect("import register");

    let mut string_filters = FilterSet::new();
    string_filters.add(parse_filter("DOCTOR contains iyer").expect("filter"));
    string_filters.add(parse_filter("SEX = f").expect("filter"));

    let mut numeric_filters = FilterSet::new();
    numeric_filters.add(parse_filter("AGE >= 30").expect("filter"));
    numeric_filters.add(parse_filter("AGE < 60").expect("filter"));

    let sort = "AGE:desc".parse::<SortDirective>().expect("sort");

    let mut group = c.benchmark_group("filter_throughput");
    group.bench_function("import_20k", |b| {
        b.iter(|| {
            ImportSession::from_reader(
                text.as_bytes(),
                &HeaderLayout::default(),
                &ReadOptions::default(),
            )
            .expect("import register")
        });
    });
    group.bench_function("string_predicates", |b| {
        b.iter(|| string_filters.apply(session.records()).len());
    });
    group.bench_function("numeric_predicates", |b| {
        b.iter(|| numeric_filters.apply(session.records()).len());
    });
    group.bench_function("filter_then_sort", |b| {
        b.iter_batched(
            || numeric_filters.apply(session.records()),
            |mut rows| sort_records(&mut rows, &sort),
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_filters);
criterion_main!(benches);
