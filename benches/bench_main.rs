use criterion::{black_box, criterion_group, criterion_main, Criterion};
use halcyon::board::Position;
use halcyon::movegen::MoveGenerator;
use halcyon::perft::perft;
use halcyon::tt::{TranspositionTable, FLAG_EXACT};

fn init_globals() {
    halcyon::init_globals();
}

fn bench_make_move(c: &mut Criterion) {
    init_globals();
    let mut group = c.benchmark_group("make_move");
    let mut pos = Position::startpos();
    let mut gen = MoveGenerator::new();
    gen.generate_all(&pos);
    let mv = gen.list.moves[0];

    group.bench_function("make_unmake_startpos", |b| {
        b.iter(|| {
            let saved = pos.do_move(black_box(mv));
            pos.undo_move(black_box(mv), saved);
        })
    });
    group.finish();
}

fn bench_tt(c: &mut Criterion) {
    init_globals();
    let mut group = c.benchmark_group("tt");
    let tt = TranspositionTable::new(16).unwrap();
    let pos = Position::startpos();

    group.bench_function("tt_probe_empty", |b| {
        b.iter(|| {
            tt.probe(black_box(pos.hash()), 0);
        })
    });

    tt.store(pos.hash(), 5, 0, 100, FLAG_EXACT, 0, 0);
    group.bench_function("tt_probe_hit", |b| {
        b.iter(|| {
            tt.probe(black_box(pos.hash()), 0);
        })
    });
    group.finish();
}

fn bench_perft(c: &mut Criterion) {
    init_globals();
    let mut group = c.benchmark_group("perft");
    group.sample_size(10);
    let mut pos = Position::startpos();
    group.bench_function("perft_4_startpos", |b| {
        b.iter(|| perft(black_box(&mut pos), 4))
    });
    group.finish();
}

criterion_group!(benches, bench_make_move, bench_tt, bench_perft);
criterion_main!(benches);
