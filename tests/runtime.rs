use anyhow::Result;
use anyhow::bail;
use futures::executor::block_on;
use sdrflow::blocks::Apply;
use sdrflow::blocks::Head;
use sdrflow::blocks::MessageSink;
use sdrflow::blocks::MessageSourceBuilder;
use sdrflow::blocks::NullSink;
use sdrflow::blocks::NullSource;
use sdrflow::blocks::Throttle;
use sdrflow::blocks::VectorSink;
use sdrflow::blocks::VectorSource;
use sdrflow::prelude::*;
use sdrflow::runtime::Config;
use sdrflow::runtime::Error;
use sdrflow::runtime::GraphState;
use sdrflow::runtime::scheduler::PartitionRunner;
use sdrflow::runtime::scheduler::Scheduler;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

fn runtime() -> Runtime {
    Runtime::with_config(Config::default())
}

/// Consumes its input and fails once it saw `n` items.
struct FailAfter {
    n: usize,
    seen: usize,
    panic: bool,
}

impl FailAfter {
    fn new(n: usize, panic: bool) -> Block {
        Block::new(
            BlockMetaBuilder::new("FailAfter").build(),
            StreamIoBuilder::new()
                .add_input("in", 4)
                .add_output("out", 4)
                .build(),
            MessageIoBuilder::new().build(),
            FailAfter { n, seen: 0, panic },
        )
    }
}

impl Kernel for FailAfter {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let input = sio.input(0);
        let n = input.available();
        input.consume(n);
        self.seen += n;

        if self.seen >= self.n {
            if self.panic {
                panic!("boom");
            }
            bail!("failed after {} items", self.seen);
        }
        if input.finished() {
            io.finished = true;
        }
        Ok(())
    }
}

/// Records messages and terminates on `Pmt::Null`.
#[derive(Default)]
struct Terminator {
    received: Vec<Pmt>,
}

impl Terminator {
    fn new() -> Block {
        Block::new(
            BlockMetaBuilder::new("Terminator").build(),
            StreamIoBuilder::new().build(),
            MessageIoBuilder::new().add_input("ctrl").build(),
            Terminator::default(),
        )
    }
}

impl Kernel for Terminator {
    fn handle(
        &mut self,
        io: &mut WorkIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
        _port: usize,
        p: Pmt,
    ) -> Result<()> {
        if p == Pmt::Null {
            io.finished = true;
        }
        self.received.push(p);
        Ok(())
    }
}

#[test]
fn stop_infinite_flowgraph() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(NullSource::<f32>::new());
    let snk = fg.add_block(NullSink::<f32>::new());
    connect!(fg, src > snk);

    let running = runtime().start(fg)?;
    let handle = running.handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.stop();
    });

    let fg = running.wait()?;
    stopper.join().unwrap();
    let n = fg.kernel::<NullSink<f32>>(snk).map(|s| s.n_received());
    assert!(n.is_some_and(|n| n > 0));
    Ok(())
}

#[test]
fn stop_is_fast_with_throttle() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(NullSource::<u8>::new());
    let throttle = fg.add_block(Throttle::<u8>::new(10.0));
    let snk = fg.add_block(NullSink::<u8>::new());
    connect!(fg, src > throttle > snk);

    let running = runtime().start(fg)?;
    thread::sleep(Duration::from_millis(100));
    let now = Instant::now();
    running.stop();
    running.wait()?;
    assert!(now.elapsed() < Duration::from_secs(1));
    Ok(())
}

#[test]
fn failing_partition_does_not_stop_others() -> Result<()> {
    let counted = Arc::new(AtomicUsize::new(0));

    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new((0..1000).collect()));
    let fail = fg.add_block(FailAfter::new(100, false));
    let snk = fg.add_block(NullSink::<u32>::new());
    connect!(fg, src > fail > snk);

    let c = counted.clone();
    let src = fg.add_block(VectorSource::<u32>::new((0..50_000).collect()));
    let count = fg.add_block(Apply::new(move |x: &u32| {
        c.fetch_add(1, Ordering::Relaxed);
        *x
    }));
    let snk = fg.add_block(VectorSink::<u32>::new(50_000));
    connect!(fg, src > count > snk);

    match runtime().run(fg) {
        Err(Error::BlockError { block, message }) => {
            assert_eq!(block, "FailAfter_0");
            assert!(message.contains("failed after"));
        }
        other => panic!("expected BlockError, got {other:?}"),
    }
    assert_eq!(counted.load(Ordering::Relaxed), 50_000);
    Ok(())
}

#[test]
fn panic_is_reported() -> Result<()> {
    let mut fg = Flowgraph::new();
    let counters = fg.counters();
    let src = fg.add_block(VectorSource::<u32>::new((0..1000).collect()));
    let fail = fg.add_block(FailAfter::new(10, true));
    let snk = fg.add_block(NullSink::<u32>::new());
    connect!(fg, src > fail > snk);

    match runtime().run(fg) {
        Err(Error::PartitionPanic { partition, message }) => {
            assert_eq!(partition, 0);
            assert_eq!(message, "boom");
        }
        other => panic!("expected PartitionPanic, got {other:?}"),
    }
    assert_eq!(counters.snapshot().as_tuple(), (0, 0, 0, 0));
    Ok(())
}

#[test]
fn lock_edit_unlock() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(NullSource::<u32>::new());
    let head = fg.add_block(Head::<u32>::new(1_000_000));
    let snk = fg.add_block(NullSink::<u32>::new());
    connect!(fg, src > head > snk);

    let mut running = runtime().start(fg)?;
    assert!(matches!(running.unlock(), Err(Error::InvalidState(_))));

    let fg = running.lock()?;
    assert_eq!(fg.state(), GraphState::Committed);
    let vsrc = fg.add_block(VectorSource::<u32>::new(vec![1, 2, 3]));
    let vsnk = fg.add_block(VectorSink::<u32>::new(3));
    fg.connect(vsrc, vsnk)?;
    assert_eq!(running.running_partitions(), 0);

    running.unlock()?;
    let fg = running.wait()?;

    assert_eq!(
        fg.kernel::<NullSink<u32>>(snk).map(|s| s.n_received()),
        Some(1_000_000)
    );
    assert_eq!(
        fg.kernel::<VectorSink<u32>>(vsnk).map(|s| s.items().to_vec()),
        Some(vec![1, 2, 3])
    );
    Ok(())
}

#[test]
fn messages_between_blocks() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(
        MessageSourceBuilder::new(Pmt::U32(42), Duration::ZERO)
            .n_messages(10)
            .build(),
    );
    let snk = fg.add_block(MessageSink::new());
    fg.connect_message(src.port("out"), snk.port("in"))?;

    let fg = runtime().run(fg)?;
    let received = fg.kernel::<MessageSink>(snk).map(|s| s.received().to_vec());
    assert_eq!(received, Some(vec![Pmt::U32(42); 10]));
    Ok(())
}

#[test]
fn post_from_outside() -> Result<()> {
    let mut fg = Flowgraph::new();
    let term = fg.add_block(Terminator::new());

    let running = runtime().start(fg)?;
    let handle = running.handle();
    assert!(matches!(
        handle.post(term, "nope", Pmt::Null),
        Err(Error::InvalidMessagePort(..))
    ));
    assert!(matches!(
        handle.post(sdrflow::runtime::BlockId(7), 0, Pmt::Null),
        Err(Error::InvalidBlock(_))
    ));
    handle.post(term, "ctrl", Pmt::from("hello"))?;
    handle.post(term, 0, Pmt::Null)?;

    let fg = block_on(running.wait_async())?;
    let received = fg.kernel::<Terminator>(term).map(|t| t.received.clone());
    assert_eq!(received, Some(vec![Pmt::from("hello"), Pmt::Null]));
    assert!(matches!(
        handle.post(term, 0, Pmt::Null),
        Err(Error::InvalidBlock(_))
    ));
    Ok(())
}

#[test]
fn run_async() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u8>::new(vec![5; 1000]));
    let snk = fg.add_block(VectorSink::<u8>::new(1000));
    connect!(fg, src > snk);

    let rt = runtime();
    let fg = block_on(rt.run_async(fg))?;
    assert_eq!(fg.kernel::<VectorSink<u8>>(snk).map(|s| s.items().len()), Some(1000));
    Ok(())
}

#[test]
fn start_rejects_invalid_graph() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(NullSource::<u8>::new());
    let snk = fg.add_block(NullSink::<u8>::new());
    let _dangling = fg.add_block(NullSink::<u8>::new());
    connect!(fg, src > snk);

    assert!(matches!(
        runtime().start(fg),
        Err(Error::UnconnectedPort { .. })
    ));
    Ok(())
}

/// Spawns threads only for the first partition while `fail` is set.
#[derive(Clone, Default)]
struct FlakyScheduler {
    fail: Arc<AtomicBool>,
}

impl Scheduler for FlakyScheduler {
    fn run_partition(&self, runner: PartitionRunner) -> Result<JoinHandle<()>, Error> {
        if self.fail.load(Ordering::SeqCst) && runner.index() > 0 {
            return Err(Error::RuntimeError("no threads left".to_string()));
        }
        Ok(thread::spawn(move || runner.run()))
    }
}

#[test]
fn failed_launch_keeps_blocks() -> Result<()> {
    let scheduler = FlakyScheduler::default();
    let fail = scheduler.fail.clone();

    let mut fg = Flowgraph::new();
    let vsrc = fg.add_block(VectorSource::<u32>::new((0..1000).collect()));
    let vsnk = fg.add_block(VectorSink::<u32>::new(1000));
    connect!(fg, vsrc > vsnk);
    let src = fg.add_block(NullSource::<u32>::new());
    let head = fg.add_block(Head::<u32>::new(10_000));
    let snk = fg.add_block(NullSink::<u32>::new());
    connect!(fg, src > head > snk);

    let rt = Runtime::with_scheduler(scheduler, Config::default());
    let mut running = rt.start(fg)?;
    running.lock()?;

    fail.store(true, Ordering::SeqCst);
    assert!(matches!(running.unlock(), Err(Error::RuntimeError(_))));
    assert_eq!(running.running_partitions(), 0);
    let fg = running.lock()?;
    assert_eq!(fg.all_blocks().len(), 5);
    assert!(fg.all_blocks().iter().all(|id| fg.block(*id).is_some()));

    fail.store(false, Ordering::SeqCst);
    running.unlock()?;
    let fg = running.wait()?;
    assert_eq!(
        fg.kernel::<VectorSink<u32>>(vsnk).map(|s| s.items().len()),
        Some(1000)
    );
    assert_eq!(
        fg.kernel::<NullSink<u32>>(snk).map(|s| s.n_received()),
        Some(10_000)
    );
    Ok(())
}
