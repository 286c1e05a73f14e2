use anyhow::Result;
use sdrflow::blocks::Copy;
use sdrflow::blocks::Nop;
use sdrflow::runtime::BlockId;
use sdrflow::runtime::Error;
use sdrflow::runtime::Flowgraph;

struct Graph {
    fg: Flowgraph,
    src1: BlockId,
    src2: BlockId,
    nop1: BlockId,
    nop2: BlockId,
    nop3: BlockId,
    dst1: BlockId,
}

fn graph() -> Graph {
    let mut fg = Flowgraph::new();
    let src1 = fg.add_block(Nop::new(4, 0, 1));
    let src2 = fg.add_block(Nop::new(4, 0, 1));
    let nop1 = fg.add_block(Nop::new(4, 1, 1));
    let nop2 = fg.add_block(Nop::new(4, 1, 1));
    let nop3 = fg.add_block(Nop::new(4, 2, 1));
    let dst1 = fg.add_block(Nop::new(4, 1, 0));
    Graph {
        fg,
        src1,
        src2,
        nop1,
        nop2,
        nop3,
        dst1,
    }
}

#[test]
fn deterministic_order() -> Result<()> {
    let Graph {
        mut fg,
        src1,
        src2,
        nop1,
        nop2,
        nop3,
        dst1,
    } = graph();

    fg.connect(src1, nop1)?;
    fg.connect(src2, nop2)?;
    fg.connect(nop1, nop3)?;
    fg.connect_ports(nop2, nop3.port(1))?;
    fg.connect(nop3, dst1)?;

    let all = fg.all_blocks();
    assert_eq!(all, vec![src1, src2, nop1, nop2, nop3, dst1]);
    let expected = vec![src2, nop2, src1, nop1, nop3, dst1];
    assert_eq!(fg.topological_sort(&all)?, expected);
    assert_eq!(fg.topological_sort(&all)?, expected);
    Ok(())
}

#[test]
fn order_does_not_depend_on_connect_order() -> Result<()> {
    let Graph {
        mut fg,
        src1,
        src2,
        nop1,
        nop2,
        nop3,
        dst1,
    } = graph();

    fg.connect(nop3, dst1)?;
    fg.connect_ports(nop2, nop3.port("in1"))?;
    fg.connect(nop1, nop3)?;
    fg.connect(src2, nop2)?;
    fg.connect(src1, nop1)?;

    let all = fg.all_blocks();
    assert_eq!(
        fg.topological_sort(&all)?,
        vec![src2, nop2, src1, nop1, nop3, dst1]
    );
    Ok(())
}

#[test]
fn sort_of_subset() -> Result<()> {
    let Graph {
        mut fg,
        src1,
        nop1,
        nop3,
        dst1,
        src2,
        nop2,
    } = graph();
    fg.connect_chain(&[src1, nop1, nop3, dst1])?;
    fg.connect_chain(&[src2, nop2])?;
    fg.connect_ports(nop2, nop3.port(1))?;

    assert_eq!(fg.topological_sort(&[dst1, nop3, nop1])?, vec![nop1, nop3, dst1]);
    assert!(matches!(
        fg.topological_sort(&[BlockId(42)]),
        Err(Error::InvalidBlock(BlockId(42)))
    ));
    Ok(())
}

#[test]
fn cycle_is_not_a_dag() -> Result<()> {
    let mut fg = Flowgraph::new();
    let a = fg.add_block(Nop::new(4, 1, 1));
    let b = fg.add_block(Nop::new(4, 1, 1));
    let c = fg.add_block(Nop::new(4, 1, 1));
    fg.connect_chain(&[a, b, c])?;
    fg.connect(c, a)?;

    let all = fg.all_blocks();
    assert!(matches!(fg.topological_sort(&all), Err(Error::NotDag { .. })));
    assert!(matches!(fg.validate(), Err(Error::NotDag { .. })));
    Ok(())
}

#[test]
fn self_loop_is_not_a_dag() -> Result<()> {
    let mut fg = Flowgraph::new();
    let copy = fg.add_block(Copy::<u32>::new());
    fg.connect(copy, copy)?;

    match fg.validate() {
        Err(Error::NotDag { block, name }) => {
            assert_eq!(block, copy);
            assert_eq!(name, "Copy_0");
        }
        other => panic!("expected NotDag, got {other:?}"),
    }
    Ok(())
}

#[test]
fn two_pipelines_two_partitions() -> Result<()> {
    let mut fg = Flowgraph::new();
    let src1 = fg.add_block(Nop::new(4, 0, 1));
    let nop1 = fg.add_block(Nop::new(4, 1, 1));
    let dst1 = fg.add_block(Nop::new(4, 1, 0));
    let src2 = fg.add_block(Nop::new(4, 0, 1));
    let nop2 = fg.add_block(Nop::new(4, 1, 1));
    let dst2 = fg.add_block(Nop::new(4, 1, 0));

    fg.connect_chain(&[src2, nop2, dst2])?;
    fg.connect_chain(&[src1, nop1, dst1])?;

    let all = fg.all_blocks();
    let partitions = fg.partition_graph(&all)?;
    assert_eq!(
        partitions,
        vec![vec![src1, nop1, dst1], vec![src2, nop2, dst2]]
    );

    fg.validate()?;
    assert_eq!(fg.partitions(), Some(partitions.as_slice()));
    Ok(())
}

#[test]
fn unique_instance_names() -> Result<()> {
    let mut fg = Flowgraph::new();
    let a = fg.add_block(Copy::<u8>::new());
    let b = fg.add_block(Copy::<u8>::new());
    let c = fg.add_block(Copy::<u8>::new());

    assert_eq!(fg.block(a).and_then(|b| b.instance_name()), Some("Copy_0"));
    assert_eq!(fg.block(b).and_then(|b| b.instance_name()), Some("Copy_1"));
    assert_eq!(fg.block(c).and_then(|b| b.instance_name()), Some("Copy_2"));
    assert_eq!(fg.block_id("Copy_1"), Some(b));
    Ok(())
}
