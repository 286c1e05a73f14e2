use anyhow::Result;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use sdrflow::blocks::Copy;
use sdrflow::blocks::Head;
use sdrflow::blocks::NullSource;
use sdrflow::blocks::VectorSink;
use sdrflow::prelude::*;
use sdrflow::runtime::Config;
use std::hint::black_box;
use std::time::Duration;
use std::time::Instant;

fn build_fg(n_samp: u64) -> Result<Flowgraph> {
    let mut fg = Flowgraph::new();

    let src = fg.add_block(NullSource::<f32>::new());
    let head = fg.add_block(Head::<f32>::new(n_samp));
    let copy = fg.add_block(Copy::<f32>::new());
    let snk = fg.add_block(VectorSink::<f32>::new(n_samp as usize));

    connect!(fg, src > head > copy > snk);
    Ok(fg)
}

fn run_fg(rt: &Runtime, n_samp: u64) -> Result<()> {
    rt.run(build_fg(n_samp)?)?;
    Ok(())
}

fn run_fg_timed(rt: &Runtime, n_samp: u64, iters: u64) -> Result<Duration> {
    let mut duration = Duration::from_secs(0);
    for _ in 0..iters {
        let mut fg = build_fg(n_samp)?;
        fg.commit(rt.config())?;

        let now = Instant::now();
        rt.run(fg)?;
        duration += now.elapsed();
    }

    Ok(duration)
}

pub fn flowgraph(c: &mut Criterion) {
    let n_samp = 123456;
    let rt = Runtime::with_config(Config::default());

    let mut group = c.benchmark_group("flowgraph");

    group.throughput(criterion::Throughput::Elements(n_samp));

    group.bench_function(format!("overall-{n_samp}"), |b| {
        b.iter(|| {
            run_fg(&rt, black_box(n_samp)).unwrap();
        });
    });

    group.bench_function(format!("run-{n_samp}"), |b| {
        b.iter_custom(|iters: u64| run_fg_timed(&rt, black_box(n_samp), black_box(iters)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, flowgraph);
criterion_main!(benches);
