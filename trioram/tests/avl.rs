//! Oblivious AVL tree: the rotation scenarios, lookups, deletions with
//! rebalancing, and delete idempotence.

mod common;

use common::{run_trio, standard_script};
use trioram::core::share::{RegAS, RegXS};
use trioram::ds::{Avl, Node};
use trioram::mpc::{reconstruct_as, reconstruct_xs};
use trioram::net::error::Result;
use trioram::net::MpcTio;

const SIZE: usize = 16;

fn as_share(tio: &MpcTio, v: u64, r: u64) -> RegAS {
    RegAS::from_share(match tio.player() {
        0 => r,
        1 => v.wrapping_sub(r),
        _ => 0,
    })
}

fn xs_share(tio: &MpcTio, v: u64, r: u64) -> RegXS {
    RegXS::from_share(match tio.player() {
        0 => r,
        1 => v ^ r,
        _ => 0,
    })
}

async fn insert_all(tio: &mut MpcTio, avl: &mut Avl, keys: &[u64]) -> Result<()> {
    for (i, k) in keys.iter().enumerate() {
        let node = Node::new(
            as_share(tio, *k, 0x9000 + i as u64),
            xs_share(tio, 1000 + k, 0x33 * (i as u64 + 1)),
        );
        avl.insert(tio, node).await?;
    }
    Ok(())
}

/// In-order keys plus (bal_l, bal_r) per row.
type TreeRows = Vec<(u64, u64, u64, bool, bool)>;

async fn scenario_rotations(mut tio: MpcTio) -> Result<(TreeRows, TreeRows)> {
    // S1: straight-line inserts force a left rotation.
    let mut avl = Avl::new(tio.player(), SIZE);
    insert_all(&mut tio, &mut avl, &[5, 7, 9]).await?;
    let (bst, balanced, height) = avl.check_avl(&mut tio).await?;
    if !tio.is_server() {
        assert!(bst && balanced);
        assert_eq!(height, 2);
    }
    let s1 = avl.reconstruct_tree(&mut tio).await?;

    // S2: zig-zag inserts force a double (LR) rotation.
    let mut avl = Avl::new(tio.player(), SIZE);
    insert_all(&mut tio, &mut avl, &[9, 5, 7]).await?;
    let (bst, balanced, height) = avl.check_avl(&mut tio).await?;
    if !tio.is_server() {
        assert!(bst && balanced);
        assert_eq!(height, 2);
    }
    let s2 = avl.reconstruct_tree(&mut tio).await?;
    Ok((s1, s2))
}

async fn scenario_delete_rebalance(mut tio: MpcTio) -> Result<(u64, TreeRows)> {
    // S3: deleting 1 unbalances the left side; the height decrease
    // propagates to the root, which ends up leaning right.
    let mut avl = Avl::new(tio.player(), SIZE);
    insert_all(&mut tio, &mut avl, &[5, 3, 12, 7, 1, 9]).await?;
    let del_key = as_share(&tio, 1, 0x777);
    let ok = avl.delete(&mut tio, del_key).await?;
    assert!(ok);
    let (bst, balanced, _h) = avl.check_avl(&mut tio).await?;
    if !tio.is_server() {
        assert!(bst && balanced);
    }
    let root = reconstruct_xs(&mut tio, avl_root(&avl), 64).await?;
    let rows = avl.reconstruct_tree(&mut tio).await?;
    Ok((root, rows))
}

async fn scenario_deep_delete(mut tio: MpcTio) -> Result<(u64, TreeRows)> {
    // S4: a 13-key tree where deleting 10 cascades rotations all the
    // way up and moves the root.
    let mut avl = Avl::new(tio.player(), SIZE);
    insert_all(
        &mut tio,
        &mut avl,
        &[9, 5, 12, 7, 3, 10, 15, 2, 4, 6, 8, 20, 1],
    )
    .await?;
    let (bst, balanced, _h) = avl.check_avl(&mut tio).await?;
    if !tio.is_server() {
        assert!(bst && balanced, "pre-delete invariants");
    }
    let del_key = as_share(&tio, 10, 0x123);
    let ok = avl.delete(&mut tio, del_key).await?;
    assert!(ok);
    let (bst, balanced, _h) = avl.check_avl(&mut tio).await?;
    if !tio.is_server() {
        assert!(bst && balanced, "post-delete invariants");
    }
    let root = reconstruct_xs(&mut tio, avl_root(&avl), 64).await?;
    let rows = avl.reconstruct_tree(&mut tio).await?;
    Ok((root, rows))
}

async fn scenario_lookup_and_idempotence(mut tio: MpcTio) -> Result<Vec<u64>> {
    let mut avl = Avl::new(tio.player(), SIZE);
    insert_all(&mut tio, &mut avl, &[50, 20, 80, 10, 30]).await?;

    let mut out = Vec::new();
    let lookup_key = as_share(&tio, 30, 0x51);
    let (found, node) = avl.lookup(&mut tio, lookup_key).await?;
    out.push(found as u64);
    out.push(reconstruct_as(&mut tio, node.key, 64).await?);
    out.push(reconstruct_xs(&mut tio, node.value, 64).await?);

    let lookup_key2 = as_share(&tio, 31, 0x52);
    let (found, _node) = avl.lookup(&mut tio, lookup_key2).await?;
    out.push(found as u64);

    // Delete the same key twice: success, then found = 0.
    let del_key1 = as_share(&tio, 20, 0x53);
    out.push(avl.delete(&mut tio, del_key1).await? as u64);
    let del_key2 = as_share(&tio, 20, 0x54);
    out.push(avl.delete(&mut tio, del_key2).await? as u64);
    let (bst, balanced, _h) = avl.check_avl(&mut tio).await?;
    if !tio.is_server() {
        assert!(bst && balanced);
    }
    // A reused slot: insert after delete goes into the freed location.
    insert_all(&mut tio, &mut avl, &[21]).await?;
    let lookup_key3 = as_share(&tio, 21, 0x55);
    let (found, _n) = avl.lookup(&mut tio, lookup_key3).await?;
    out.push(found as u64);
    Ok(out)
}

fn avl_root(avl: &Avl) -> RegXS {
    avl.root_share()
}

fn keys_of(rows: &TreeRows) -> Vec<u64> {
    rows.iter().map(|r| r.0).collect()
}

#[tokio::test]
async fn single_and_double_rotations() {
    let (p0, p1, _srv) = run_trio(standard_script(), scenario_rotations).await;
    let (s1, s2) = p0;
    assert_eq!((s1.clone(), s2.clone()), p1);
    // Both orders produce root 7 with children {5, 9}, all balanced.
    for rows in [s1, s2] {
        assert_eq!(keys_of(&rows), vec![5, 7, 9]);
        for (key, left, right, bal_l, bal_r) in rows {
            if key == 7 {
                assert_ne!(left, 0);
                assert_ne!(right, 0);
            } else {
                assert_eq!(left, 0);
                assert_eq!(right, 0);
            }
            assert!(!bal_l && !bal_r, "balance bits clear at {key}");
        }
    }
}

#[tokio::test]
async fn delete_propagates_height_change() {
    let (p0, _p1, _srv) = run_trio(standard_script(), scenario_delete_rebalance).await;
    let (root, rows) = p0;
    assert_eq!(root, 5);
    assert_eq!(keys_of(&rows), vec![3, 5, 7, 9, 12]);
    for (key, _l, _r, bal_l, bal_r) in rows {
        if key == 5 {
            assert!(!bal_l && bal_r, "root leans right after the delete");
        } else {
            assert!(!bal_l && !bal_r, "other balances clear at {key}");
        }
    }
}

#[tokio::test]
async fn delete_cascades_rotations_to_root() {
    let (p0, _p1, _srv) = run_trio(standard_script(), scenario_deep_delete).await;
    let (root, rows) = p0;
    assert_eq!(root, 5, "the root moves to 5");
    assert_eq!(keys_of(&rows), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 12, 15, 20]);
    for (key, _l, _r, bal_l, bal_r) in rows {
        if key == 2 {
            assert!(bal_l && !bal_r);
        } else if key == 3 {
            assert!(bal_l && !bal_r);
        } else {
            assert!(!bal_l && !bal_r, "balance clear at {key}");
        }
    }
}

#[tokio::test]
async fn lookup_and_double_delete() {
    let (p0, p1, _srv) = run_trio(standard_script(), scenario_lookup_and_idempotence).await;
    assert_eq!(p0, p1);
    assert_eq!(p0, vec![1, 30, 1030, 0, 1, 0, 1]);
}
