use anyhow::Result;
use sdrflow::blocks::AddConst;
use sdrflow::blocks::Apply;
use sdrflow::blocks::Copy;
use sdrflow::blocks::Head;
use sdrflow::blocks::Nop;
use sdrflow::blocks::NullSink;
use sdrflow::blocks::NullSource;
use sdrflow::blocks::VectorSink;
use sdrflow::blocks::VectorSource;
use sdrflow::connect;
use sdrflow::runtime::BlockId;
use sdrflow::runtime::Config;
use sdrflow::runtime::Flowgraph;
use sdrflow::runtime::FlowgraphDescription;
use sdrflow::runtime::GraphState;
use sdrflow::runtime::HierBlock;
use sdrflow::runtime::Runtime;
use sdrflow::runtime::buffer::BufferSize;

fn runtime() -> Runtime {
    Runtime::with_config(Config::default())
}

fn items<T: core::marker::Copy + Send + 'static>(fg: &Flowgraph, snk: BlockId) -> Vec<T> {
    fg.kernel::<VectorSink<T>>(snk)
        .map(|s| s.items().to_vec())
        .unwrap_or_default()
}

#[test]
fn add_const_pairwise() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(vec![0, 1, 2, 3]));
    let add = fg.add_block(AddConst::<u32>::new(2));
    let snk = fg.add_block(VectorSink::<u32>::new(4));
    fg.connect(src, add)?;
    fg.connect(add, snk)?;

    let fg = runtime().run(fg)?;
    assert_eq!(items::<u32>(&fg, snk), vec![2, 3, 4, 5]);
    Ok(())
}

#[test]
fn add_const_chain() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(vec![0, 1, 2, 3]));
    let add = fg.add_block(AddConst::<u32>::new(2));
    let snk = fg.add_block(VectorSink::<u32>::new(4));
    fg.connect_chain(&[src, add, snk])?;

    let fg = runtime().run(fg)?;
    assert_eq!(items::<u32>(&fg, snk), vec![2, 3, 4, 5]);
    Ok(())
}

#[test]
fn add_const_macro() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(vec![0, 1, 2, 3]));
    let add = fg.add_block(AddConst::<u32>::new(2));
    let snk = fg.add_block(VectorSink::<u32>::new(4));
    connect!(fg, src > add > snk);

    let fg = runtime().run(fg)?;
    assert_eq!(items::<u32>(&fg, snk), vec![2, 3, 4, 5]);
    Ok(())
}

#[test]
fn named_ports() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<f32>::new(vec![1.0, 2.0]));
    let double = fg.add_block(Apply::new(|x: &f32| *x * 2.0));
    let snk = fg.add_block(VectorSink::<f32>::new(2));
    fg.connect_stream(src, "out", double, "in")?;
    fg.connect_ports(double.port("out"), (snk, "in"))?;

    let fg = runtime().run(fg)?;
    assert_eq!(items::<f32>(&fg, snk), vec![2.0, 4.0]);
    Ok(())
}

#[test]
fn head_terminates_infinite_source() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(NullSource::<f32>::new());
    let copy = fg.add_block(Copy::<f32>::new());
    let head = fg.add_block(Head::<f32>::new(1_000_000));
    let snk = fg.add_block(VectorSink::<f32>::new(1_000_000));
    connect!(fg, src > copy > head > snk);

    let fg = runtime().run(fg)?;
    let v = items::<f32>(&fg, snk);
    assert_eq!(v.len(), 1_000_000);
    assert!(v.iter().all(|i| i.abs() < f32::EPSILON));
    Ok(())
}

#[test]
fn fan_out() -> Result<()> {
    let data: Vec<u64> = (0..100_000).collect();
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u64>::new(data.clone()));
    let snk1 = fg.add_block(VectorSink::<u64>::new(data.len()));
    let snk2 = fg.add_block(VectorSink::<u64>::new(data.len()));
    fg.connect(src, snk1)?;
    fg.connect_with_buffer(src, snk2, BufferSize::Items(64))?;

    let fg = runtime().run(fg)?;
    assert_eq!(items::<u64>(&fg, snk1), data);
    assert_eq!(items::<u64>(&fg, snk2), data);
    Ok(())
}

#[test]
fn disabled_block_is_bypassed() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(vec![0, 1, 2, 3]));
    let add = fg.add_block(AddConst::<u32>::new(2));
    let snk = fg.add_block(VectorSink::<u32>::new(4));
    connect!(fg, src > add > snk);
    fg.set_enabled(add, false)?;

    fg.validate()?;
    assert_eq!(fg.partitions(), Some(&[vec![src, snk]][..]));

    let fg = runtime().run(fg)?;
    assert_eq!(items::<u32>(&fg, snk), vec![0, 1, 2, 3]);
    assert!(fg.block(add).is_some_and(|b| b.detail().is_none()));
    Ok(())
}

#[test]
fn disabled_block_is_elided() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(vec![7, 8]));
    let snk = fg.add_block(VectorSink::<u32>::new(2));
    let nop = fg.add_block(Nop::new(4, 1, 0));
    fg.connect(src, snk)?;
    fg.connect(src, nop)?;
    fg.set_enabled(nop, false)?;

    fg.commit(&Config::default())?;
    assert_eq!(fg.allocations().as_tuple(), (3, 2, 1, 1));

    let mut fg = runtime().run(fg)?;
    assert_eq!(items::<u32>(&fg, snk), vec![7, 8]);

    fg.set_enabled(nop, true)?;
    assert_eq!(fg.state(), GraphState::Building);
    fg.commit(&Config::default())?;
    assert_eq!(fg.allocations().as_tuple(), (3, 3, 1, 2));
    Ok(())
}

#[test]
fn hier_block_matches_flat_graph() -> Result<()> {
    let data: Vec<u32> = (0..10_000).collect();

    let mut flat = Flowgraph::new();
    let src = flat.add_block(VectorSource::<u32>::new(data.clone()));
    let a = flat.add_block(AddConst::<u32>::new(1));
    let b = flat.add_block(AddConst::<u32>::new(10));
    let flat_snk = flat.add_block(VectorSink::<u32>::new(data.len()));
    connect!(flat, src > a > b > flat_snk);

    let mut hier = HierBlock::new("AddEleven")
        .with_input("in", 4)
        .with_output("out", 4);
    let a = hier.add_block(AddConst::<u32>::new(1));
    let b = hier.add_block(AddConst::<u32>::new(10));
    hier.connect(a, b)?;
    hier.connect_input("in", a)?;
    hier.connect_output(b, "out")?;
    assert_eq!(hier.get_sources(), vec![a.port(0)]);
    assert_eq!(hier.get_sinks(), vec![b.port(0)]);

    let mut nested = Flowgraph::new();
    let src = nested.add_block(VectorSource::<u32>::new(data.clone()));
    let h = nested.add_block(hier);
    let nested_snk = nested.add_block(VectorSink::<u32>::new(data.len()));
    connect!(nested, src > h > nested_snk);

    flat.commit(&Config::default())?;
    nested.commit(&Config::default())?;
    assert_eq!(flat.allocations(), nested.allocations());
    assert_eq!(
        flat.partitions().map(|p| p[0].len()),
        nested.partitions().map(|p| p[0].len())
    );
    let all = nested.all_blocks();
    assert_eq!(nested.topological_sort(&all)?.len(), 4);

    let flat = runtime().run(flat)?;
    let nested = runtime().run(nested)?;
    let expected: Vec<u32> = data.iter().map(|x| x + 11).collect();
    assert_eq!(items::<u32>(&flat, flat_snk), expected);
    assert_eq!(items::<u32>(&nested, nested_snk), expected);
    Ok(())
}

#[test]
fn nested_hier_blocks_are_rewired() -> Result<()> {
    let mut inner = HierBlock::new("Inner")
        .with_input("in", 4)
        .with_output("out", 4);
    let a = inner.add_block(AddConst::<u32>::new(1));
    let b = inner.add_block(AddConst::<u32>::new(10));
    inner.connect(a, b)?;
    inner.connect_input("in", a)?;
    inner.connect_output(b, "out")?;

    let mut outer = HierBlock::new("Outer")
        .with_input("in", 4)
        .with_output("out", 4);
    let i = outer.add_block(inner);
    outer.connect_input("in", i)?;
    outer.connect_output(i, "out")?;

    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(vec![0, 1, 2, 3]));
    let o = fg.add_block(outer);
    let snk = fg.add_block(VectorSink::<u32>::new(4));
    connect!(fg, src > o > snk);

    let fg = runtime().run(fg)?;
    assert!(fg.block_id("Outer_0/Inner_0/AddConst_0").is_some());
    assert!(fg.block_id("Outer_0/Inner_0/AddConst_1").is_some());
    assert_eq!(fg.all_blocks().len(), 4);
    assert_eq!(items::<u32>(&fg, snk), vec![11, 12, 13, 14]);
    Ok(())
}

#[test]
fn nested_hier_block_between_leaves() -> Result<()> {
    let data: Vec<u32> = (0..1000).collect();

    let mut inner = HierBlock::new("Inner")
        .with_input("in", 4)
        .with_output("out", 4);
    let a = inner.add_block(AddConst::<u32>::new(10));
    inner.connect_input("in", a)?;
    inner.connect_output(a, "out")?;

    let mut outer = HierBlock::new("Outer")
        .with_input("in", 4)
        .with_output("out", 4);
    let pre = outer.add_block(AddConst::<u32>::new(1));
    let i = outer.add_block(inner);
    let post = outer.add_block(Copy::<u32>::new());
    outer.connect_chain(&[pre, i, post])?;
    outer.connect_input("in", pre)?;
    outer.connect_output(post, "out")?;

    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(data.clone()));
    let o = fg.add_block(outer);
    let snk = fg.add_block(VectorSink::<u32>::new(data.len()));
    connect!(fg, src > o > snk);

    let fg = runtime().run(fg)?;
    let expected: Vec<u32> = data.iter().map(|x| x + 11).collect();
    assert_eq!(items::<u32>(&fg, snk), expected);
    Ok(())
}

#[test]
fn description_serializes() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(NullSource::<u8>::new());
    let snk = fg.add_block(NullSink::<u8>::new());
    fg.connect(src, snk)?;

    let desc = fg.description();
    assert_eq!(desc.blocks.len(), 2);
    assert_eq!(desc.blocks[0].instance_name, "NullSource_0");
    assert_eq!(desc.blocks[1].stream_inputs, vec!["in".to_string()]);
    assert_eq!(desc.stream_edges, vec![(src.0, 0, snk.0, 0)]);

    let json = serde_json::to_string(&desc)?;
    let back: FlowgraphDescription = serde_json::from_str(&json)?;
    assert_eq!(back, desc);
    Ok(())
}

#[test]
fn restart_keeps_committed_state() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src = fg.add_block(VectorSource::<u32>::new(vec![1, 2, 3]));
    let snk = fg.add_block(VectorSink::<u32>::new(3));
    fg.connect(src, snk)?;

    let rt = runtime();
    let fg = rt.run(fg)?;
    assert_eq!(fg.state(), GraphState::Committed);
    let fg = rt.run(fg)?;
    assert_eq!(items::<u32>(&fg, snk), vec![1, 2, 3]);
    Ok(())
}
