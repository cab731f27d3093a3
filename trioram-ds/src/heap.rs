//! The oblivious min-heap.
//!
//! A 1-based implicit binary heap in a `Duoram<RegAS>`; the number of
//! items is public, the values and all comparison outcomes are not.
//! Slot 0 is unused and free slots hold a sentinel larger than any real
//! key.

use tracing::debug;

use trioram_core::share::{RegAS, RegBS, RegXS};
use trioram_dpf::{Cdpf, RdpfBundle};
use trioram_mpc::{and, flagmult, flagmult_batch, select, select_xs};
use trioram_net::error::Result;
use trioram_net::MpcTio;
use trioram_oram::{
    access_many, explicit_read, explicit_update_batch, explicit_write, first_geq_xs, init_fill,
    init_with, reconstruct, unit_vector_bits, AccessOp, Duoram, Flat, IndexShare, OblivIndex,
    Pad, Path, Shape, Stride,
};

/// Free heap slots hold this, so sentinel reads compare above any key.
pub const HEAP_SENTINEL: u64 = 0x7fff_ffff_ffff_ffff;

pub struct MinHeap {
    oram: Duoram<RegAS>,
    /// Number of items currently in the heap; public by design.
    pub num_items: usize,
}

impl MinHeap {
    pub fn new(player: u8, size: usize) -> Self {
        MinHeap {
            oram: Duoram::new(player, size),
            num_items: 0,
        }
    }

    fn whole(&self) -> Flat {
        Flat::whole(self.oram.size())
    }

    /// Fill the array with the sentinel. Local.
    pub fn init(&mut self) {
        let flat = self.whole();
        init_fill(&mut self.oram, &flat, HEAP_SENTINEL);
        self.num_items = 0;
    }

    /// Install the values 1..=n (already a heap). Local; used to set up
    /// timing and correctness experiments.
    pub fn init_sequential(&mut self, n: usize) {
        self.init();
        init_with(&mut self.oram, &Flat::sub(1, n), |i| (i + 1) as u64);
        self.num_items = n;
    }

    /// Basic insert: append at the next free slot, then bubble up with
    /// one oblivious compare-and-swap per level.
    pub async fn insert(&mut self, tio: &mut MpcTio, val: RegAS) -> Result<()> {
        let flat = self.whole();
        self.num_items += 1;
        let mut childindex = self.num_items;
        let mut parentindex = childindex / 2;
        debug!(childindex, "heap insert");
        explicit_write(tio, &mut self.oram, &flat, childindex, val).await?;

        while parentindex > 0 {
            let mut child = explicit_read(&self.oram, &flat, childindex);
            let mut parent = explicit_read(&self.oram, &flat, parentindex);
            let child0 = child;
            let parent0 = parent;
            let cdpf = Cdpf::fetch(tio).await?;
            let (lt, eq, _gt) = cdpf.compare(tio, child - parent).await?;
            let lteq = lt ^ eq;
            trioram_mpc::oswap(tio, &mut child, &mut parent, lteq, 64).await?;
            explicit_update_batch(
                tio,
                &mut self.oram,
                &flat,
                &[(childindex, child - child0), (parentindex, parent - parent0)],
            )
            .await?;
            childindex = parentindex;
            parentindex /= 2;
        }
        Ok(())
    }

    /// Optimized insert: the root-to-leaf path through the new slot is
    /// sorted (the slot itself holds the sentinel), so one bit-built
    /// binary search finds the insertion point, one small DPF expands it
    /// into a unit vector, and a single round of flag-word multiplies
    /// shifts the tail of the path down while writing the new value.
    pub async fn insert_optimized(&mut self, tio: &mut MpcTio, val: RegAS) -> Result<()> {
        let flat = self.whole();
        self.num_items += 1;
        let childindex = self.num_items;
        let mut sentinel = RegAS::default();
        if tio.player() == 0 {
            sentinel.set(HEAP_SENTINEL);
        }
        explicit_write(tio, &mut self.oram, &flat, childindex, sentinel).await?;

        let path = Path::down_to(flat, childindex);
        let h = path.len();
        debug!(childindex, h, "heap insert (path search)");

        // Where along the path does val belong? flag is the unit vector
        // at that position; u is its running XOR, 1 from the insertion
        // point down.
        let foundidx = first_geq_xs(tio, &mut self.oram, &path, val).await?;
        let pad_bits = Pad::new(path, path.len().next_power_of_two().max(2), HEAP_SENTINEL)
            .addr_bits();
        let mut oidx = OblivIndex::fetch(tio, foundidx, pad_bits, 1).await?;
        let bundle = oidx.bundle();
        let flag = unit_vector_bits(tio, &bundle, h, foundidx).await?;
        let mut u = Vec::with_capacity(h);
        let mut run = RegBS::default();
        for f in &flag {
            run ^= *f;
            u.push(run);
        }

        let old: Vec<RegAS> = (0..h).map(|j| explicit_read(&self.oram, &path, j)).collect();

        // path[j] += u[j-1]*(path[j-1]-path[j]) + flag[j]*(val-path[j]),
        // all in one message.
        let mut items = Vec::with_capacity(2 * h);
        for j in 1..h {
            items.push((u[j - 1], old[j - 1] - old[j]));
        }
        for j in 0..h {
            items.push((flag[j], val - old[j]));
        }
        let prods = flagmult_batch(tio, &items, 64).await?;
        let (shifts, writes) = prods.split_at(h - 1);

        let mut updates = Vec::with_capacity(h);
        for j in 0..h {
            let mut delta = writes[j];
            if j >= 1 {
                delta += shifts[j - 1];
            }
            updates.push((j, delta));
        }
        explicit_update_batch(tio, &mut self.oram, &path, &updates).await
    }

    /// Restore the heap property at the root (public index): three local
    /// reads, two compares, then the three-way oblivious fixup. Returns
    /// the XOR-shared index of the smaller child and the compare bit
    /// used to steer an OblivIndex.
    async fn restore_at_root(&mut self, tio: &mut MpcTio) -> Result<(RegXS, RegBS)> {
        let flat = self.whole();
        let parent = explicit_read(&self.oram, &flat, 1);
        let leftchild = explicit_read(&self.oram, &flat, 2);
        let rightchild = explicit_read(&self.oram, &flat, 3);

        let cdpf = Cdpf::fetch(tio).await?;
        let (lt, eq, gt) = cdpf.compare(tio, leftchild - rightchild).await?;
        let lteq = lt ^ eq;
        let smallerchild = select(tio, lteq, rightchild, leftchild, 64).await?;
        let smallerindex = (RegXS::from(lteq) & 2) ^ (RegXS::from(gt) & 3);

        let cdpf0 = Cdpf::fetch(tio).await?;
        let (lt1, eq1, _gt1) = cdpf0.compare(tio, smallerchild - parent).await?;
        let lt1eq1 = lt1 ^ eq1;
        let ltlt1 = and(tio, lteq, lt1eq1).await?;

        let update_leftindex_by = flagmult(tio, ltlt1, parent - leftchild, 64).await?;
        let update_index_by = flagmult(tio, lt1eq1, smallerchild - parent, 64).await?;

        explicit_update_batch(
            tio,
            &mut self.oram,
            &flat,
            &[
                (1, update_index_by),
                (2, update_leftindex_by),
                (3, -(update_index_by + update_leftindex_by)),
            ],
        )
        .await?;
        Ok((smallerindex, gt))
    }

    /// Restore the heap property at a secret index: three oblivious
    /// reads, two compares, three oblivious updates reusing the read
    /// DPFs. Returns the smaller child's index.
    async fn restore_basic(&mut self, tio: &mut MpcTio, index: RegXS) -> Result<RegXS> {
        let flat = self.whole();
        let depth = flat.addr_bits();
        let leftchildindex = RegXS::from_share(index.xshare << 1);
        let mut rightchildindex = leftchildindex;
        rightchildindex.xshare ^= tio.player() as u64 & 1;

        let b_parent = RdpfBundle::fetch(tio, depth, 1).await?;
        let b_left = RdpfBundle::fetch(tio, depth, 1).await?;
        let b_right = RdpfBundle::fetch(tio, depth, 1).await?;
        let mut reads = [
            AccessOp {
                shapes: vec![flat],
                index: IndexShare::Xs(index),
                bundle: &b_parent,
                deltas: None,
            },
            AccessOp {
                shapes: vec![flat],
                index: IndexShare::Xs(leftchildindex),
                bundle: &b_left,
                deltas: None,
            },
            AccessOp {
                shapes: vec![flat],
                index: IndexShare::Xs(rightchildindex),
                bundle: &b_right,
                deltas: None,
            },
        ];
        let res = access_many(tio, &mut self.oram, &mut reads).await?;
        let parent = res[0].first().copied().unwrap_or_default();
        let leftchild = res[1].first().copied().unwrap_or_default();
        let rightchild = res[2].first().copied().unwrap_or_default();

        let cdpf = Cdpf::fetch(tio).await?;
        let (lt, eq, _gt) = cdpf.compare(tio, leftchild - rightchild).await?;
        let lteq = lt ^ eq;
        let smallerindex = select_xs(tio, lteq, rightchildindex, leftchildindex).await?;
        let smallerchild = select(tio, lteq, rightchild, leftchild, 64).await?;

        let cdpf0 = Cdpf::fetch(tio).await?;
        let (lt1, eq1, _gt1) = cdpf0.compare(tio, smallerchild - parent).await?;
        let lt1eq1 = lt1 ^ eq1;
        let ltlt1 = and(tio, lteq, lt1eq1).await?;

        let update_leftindex_by = flagmult(tio, ltlt1, parent - leftchild, 64).await?;
        let update_index_by = flagmult(tio, lt1eq1, smallerchild - parent, 64).await?;

        let mut writes = [
            AccessOp {
                shapes: vec![flat],
                index: IndexShare::Xs(index),
                bundle: &b_parent,
                deltas: Some(vec![update_index_by]),
            },
            AccessOp {
                shapes: vec![flat],
                index: IndexShare::Xs(leftchildindex),
                bundle: &b_left,
                deltas: Some(vec![update_leftindex_by]),
            },
            AccessOp {
                shapes: vec![flat],
                index: IndexShare::Xs(rightchildindex),
                bundle: &b_right,
                deltas: Some(vec![-(update_index_by + update_leftindex_by)]),
            },
        ];
        access_many(tio, &mut self.oram, &mut writes).await?;
        Ok(smallerindex)
    }

    /// The width-3 variant: the parent row and the two (stride-2) child
    /// rows of one tree level are all addressed through one bundle of
    /// the cursor, reads and updates alike.
    async fn restore_optimized(
        &mut self,
        tio: &mut MpcTio,
        index: RegXS,
        layer: u8,
        oidx: &mut OblivIndex,
    ) -> Result<(RegXS, RegBS)> {
        let leftchildindex = RegXS::from_share(index.xshare << 1);
        let mut rightchildindex = leftchildindex;
        rightchildindex.xshare ^= tio.player() as u64 & 1;

        let parent_row = Flat::sub(1 << layer, 1 << layer);
        let child_row = Flat::sub(2 << layer, 2 << layer);
        let p = Stride::new(parent_row, 0, 1);
        let l = Stride::new(child_row, 0, 2);
        let r = Stride::new(child_row, 1, 2);

        let bundle = oidx.bundle();
        let mut reads = [AccessOp {
            shapes: vec![p, l, r],
            index: IndexShare::Xs(oidx.index()),
            bundle: &bundle,
            deltas: None,
        }];
        let res = access_many(tio, &mut self.oram, &mut reads).await?;
        let (parent, leftchild, rightchild) = match res[0].as_slice() {
            [a, b, c] => (*a, *b, *c),
            _ => Default::default(),
        };

        let cdpf = Cdpf::fetch(tio).await?;
        let (lt, eq, gt) = cdpf.compare(tio, leftchild - rightchild).await?;
        let lteq = lt ^ eq;
        let smallerindex = select_xs(tio, lteq, rightchildindex, leftchildindex).await?;
        let smallerchild = select(tio, lteq, rightchild, leftchild, 64).await?;

        let cdpf0 = Cdpf::fetch(tio).await?;
        let (lt1, eq1, _gt1) = cdpf0.compare(tio, smallerchild - parent).await?;
        let lt1eq1 = lt1 ^ eq1;
        let ltlt1 = and(tio, lteq, lt1eq1).await?;

        let update_leftindex_by = flagmult(tio, ltlt1, parent - leftchild, 64).await?;
        let update_index_by = flagmult(tio, lt1eq1, smallerchild - parent, 64).await?;

        let mut writes = [AccessOp {
            shapes: vec![p, l, r],
            index: IndexShare::Xs(oidx.index()),
            bundle: &bundle,
            deltas: Some(vec![
                update_index_by,
                update_leftindex_by,
                -(update_index_by + update_leftindex_by),
            ]),
        }];
        access_many(tio, &mut self.oram, &mut writes).await?;
        Ok((smallerindex, gt))
    }

    /// Extract the minimum: return the root, move the last item into its
    /// place, and sift down. The returned value is a fresh-enough
    /// additive share; extracting from an all-sentinel heap returns the
    /// sentinel.
    pub async fn extract_min(&mut self, tio: &mut MpcTio, optimized: bool) -> Result<RegAS> {
        let flat = self.whole();
        let minval = explicit_read(&self.oram, &flat, 1);
        if self.num_items == 0 {
            return Ok(minval);
        }
        let last = explicit_read(&self.oram, &flat, self.num_items);
        explicit_write(tio, &mut self.oram, &flat, 1, last).await?;
        let mut sentinel = RegAS::default();
        if tio.player() == 0 {
            sentinel.set(HEAP_SENTINEL);
        }
        explicit_write(tio, &mut self.oram, &flat, self.num_items, sentinel).await?;
        self.num_items -= 1;
        if self.num_items < 2 {
            return Ok(minval);
        }

        let height = usize::BITS as u8 - 1 - self.num_items.leading_zeros() as u8;
        let (mut smaller, gt) = self.restore_at_root(tio).await?;
        if optimized && height >= 2 {
            let mut oidx = OblivIndex::fetch_descent(tio, 1, height - 1, 3).await?;
            oidx.incr(gt);
            for layer in 1..height {
                let (next, went_right) =
                    self.restore_optimized(tio, smaller, layer, &mut oidx).await?;
                smaller = next;
                oidx.incr(went_right);
            }
        } else {
            for _ in 1..height {
                smaller = self.restore_basic(tio, smaller).await?;
            }
        }
        Ok(minval)
    }

    /// Reconstruct and check the heap property. Test harness only; the
    /// assertions run at the computational parties.
    pub async fn verify_heap_property(&mut self, tio: &mut MpcTio) -> Result<()> {
        let flat = self.whole();
        let r = reconstruct(tio, &self.oram, &flat).await?;
        if tio.is_server() {
            return Ok(());
        }
        for j in 1..=self.num_items {
            for c in [2 * j, 2 * j + 1] {
                if c <= self.num_items {
                    assert!(
                        r[j].ashare <= r[c].ashare,
                        "heap property violated at {j} vs {c}"
                    );
                }
            }
        }
        Ok(())
    }

    /// Reconstructed contents, for tests.
    pub async fn reconstruct(&mut self, tio: &mut MpcTio) -> Result<Vec<RegAS>> {
        let flat = self.whole();
        reconstruct(tio, &self.oram, &flat).await
    }
}
