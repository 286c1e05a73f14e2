use anyhow::Result;
use proptest::prelude::*;
use rand::Rng;
use sdrflow::blocks;
use sdrflow::blocks::VectorSink;
use sdrflow::blocks::VectorSource;
use sdrflow::prelude::*;
use sdrflow::runtime::BlockId;
use sdrflow::runtime::Config;
use sdrflow::runtime::buffer::BufferSize;

/// Copies in multiples of `chunk` items. Only the tail of a finished stream may be shorter.
struct Chunked {
    chunk: usize,
}

impl Chunked {
    fn new(chunk: usize) -> Block {
        Block::new(
            BlockMetaBuilder::new("Chunked").build(),
            StreamIoBuilder::new()
                .add_input("in", 4)
                .min_items(chunk)
                .add_output("out", 4)
                .min_items(chunk)
                .build(),
            MessageIoBuilder::new().build(),
            Chunked { chunk },
        )
    }
}

impl Kernel for Chunked {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let (inputs, outputs) = sio.split();
        let i = inputs[0].slice::<u32>();
        let o = outputs[0].slice::<u32>();

        let mut n = i.len().min(o.len());
        if !inputs[0].upstream_done() || n < i.len() {
            n -= n % self.chunk;
        }
        o[..n].copy_from_slice(&i[..n]);
        inputs[0].consume(n);
        outputs[0].produce(n);

        if inputs[0].finished() {
            io.finished = true;
        }
        Ok(())
    }
}

fn run_chain(data: Vec<u32>, stages: &[(usize, usize)]) -> Result<Vec<u32>> {
    let len = data.len();
    let mut fg = Flowgraph::new();
    let mut prev = fg.add_block(VectorSource::<u32>::new(data));
    for (chunk, capacity) in stages {
        let b = fg.add_block(Chunked::new(*chunk));
        fg.connect_with_buffer(prev.port(0), b.port(0), BufferSize::Items(*capacity))?;
        prev = b;
    }
    let snk = fg.add_block(VectorSink::<u32>::new(len));
    fg.connect(prev, snk)?;

    let fg = Runtime::with_config(Config::default()).run(fg)?;
    Ok(items(&fg, snk))
}

fn items(fg: &Flowgraph, snk: BlockId) -> Vec<u32> {
    fg.kernel::<VectorSink<u32>>(snk)
        .map(|s| s.items().to_vec())
        .unwrap_or_default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn chains_preserve_items(
        len in 0usize..5000,
        stages in prop::collection::vec((1usize..32, 0usize..64), 1..5),
    ) {
        let data: Vec<u32> = (0..len as u32).collect();
        // room for one chunk of the producer next to a partial chunk of the consumer
        let mut prev = 1;
        let stages: Vec<(usize, usize)> = stages
            .into_iter()
            .map(|(c, extra)| {
                let capacity = prev + c + extra;
                prev = c;
                (c, capacity)
            })
            .collect();
        let out = run_chain(data.clone(), &stages).unwrap();
        prop_assert_eq!(out, data);
    }
}

#[test]
fn tiny_buffers() -> Result<()> {
    let mut rng = rand::rng();
    let data: Vec<u32> = (0..20_000).map(|_| rng.random()).collect();

    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(data.clone()));
    let cpy0 = fg.add_block(blocks::Copy::<u32>::new());
    let cpy1 = fg.add_block(blocks::Copy::<u32>::new());
    let snk = fg.add_block(VectorSink::<u32>::new(data.len()));
    fg.connect_with_buffer(src, cpy0, BufferSize::Items(1))?;
    fg.connect_with_buffer(cpy0, cpy1, BufferSize::Items(3))?;
    fg.connect_with_buffer(cpy1, snk, BufferSize::Items(2))?;

    let fg = Runtime::with_config(Config::default()).run(fg)?;
    assert_eq!(items(&fg, snk), data);
    Ok(())
}

#[test]
fn undersized_buffer_is_rejected() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(vec![1, 2, 3]));
    let chunked = fg.add_block(Chunked::new(16));
    let snk = fg.add_block(VectorSink::<u32>::new(3));
    fg.connect_with_buffer(src, chunked, BufferSize::Items(8))?;
    fg.connect(chunked, snk)?;

    let res = fg.commit(&Config::default());
    assert!(matches!(
        res,
        Err(sdrflow::runtime::Error::BufferSizing {
            capacity: 8,
            required: 16,
            ..
        })
    ));
    Ok(())
}
