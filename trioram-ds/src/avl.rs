//! The oblivious AVL tree.
//!
//! Nodes live in a `Duoram<Node>` arena and address each other by
//! XOR-shared index; index 0 is the NULL sentinel and the root index is
//! itself a secret. The pointer word of a node packs both child indices
//! and the two balance bits:
//!
//! ```text
//! | left child (bits 34..63) | right child (bits 4..33) | unused | bal_l (bit 1) | bal_r (bit 0) |
//! ```
//!
//! A reconstructed balance of -1/0/+1 is encoded by (bal_l, bal_r) in
//! {(1,0), (0,0), (0,1)}.
//!
//! Every operation descends with a fixed time-to-live derived from the
//! AVL height bound, doing identical work at each level whether or not
//! the key has been found, so nothing about the key or the tree shape
//! leaks.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use trioram_core::share::{RegAS, RegBS, RegXS};
use trioram_core::value::NBits;
use trioram_core::wire::Wire;
use trioram_dpf::{Cdpf, Leaf, Rdpf, RdpfBundle};
use trioram_mpc::{and, or, reconstruct_bs, select, select_bs, select_xs};
use trioram_net::error::Result;
use trioram_net::MpcTio;
use trioram_oram::{
    explicit_write, read, reconstruct, update, Cell, Duoram, Flat, IndexShare, Shape,
};

/// Child pointers are this many bits wide.
pub const AVL_PTR_SIZE: NBits = 30;

const PTR_MASK: u64 = (1 << AVL_PTR_SIZE) - 1;
const LEFT_SHIFT: u32 = 34;
const RIGHT_SHIFT: u32 = 4;

/// One tree node: an additively shared key (so comparisons are cheap),
/// an XOR-shared packed pointer word, and an XOR-shared value.
#[derive(Clone, Copy, Debug, Default)]
pub struct Node {
    pub key: RegAS,
    pub pointers: RegXS,
    pub value: RegXS,
}

impl Node {
    pub fn new(key: RegAS, value: RegXS) -> Self {
        Node {
            key,
            pointers: RegXS::default(),
            value,
        }
    }
}

impl Cell for Node {
    const WIDTH: usize = 3;
    const SIZE: usize = 24;

    fn randomize(&mut self) {
        self.key.randomize(64);
        self.pointers.randomize(64);
        self.value.randomize(64);
    }

    fn add(&mut self, rhs: &Self) {
        self.key += rhs.key;
        self.pointers ^= rhs.pointers;
        self.value ^= rhs.value;
    }

    fn sub(&mut self, rhs: &Self) {
        self.key -= rhs.key;
        self.pointers ^= rhs.pointers;
        self.value ^= rhs.value;
    }

    fn neg(self) -> Self {
        Node {
            key: -self.key,
            pointers: self.pointers,
            value: self.value,
        }
    }

    fn fill(v: u64) -> Self {
        Node {
            key: RegAS::from_share(v),
            pointers: RegXS::from_share(v),
            value: RegXS::from_share(v),
        }
    }

    fn mul_unit(&self, dpf: &Rdpf, leaf: &Leaf) -> Self {
        let ext = dpf.unit_xs(leaf).xshare;
        Node {
            key: RegAS::from_share(dpf.unit_as(leaf).ashare.wrapping_mul(self.key.ashare)),
            pointers: RegXS::from_share(ext & self.pointers.xshare),
            value: RegXS::from_share(ext & self.value.xshare),
        }
    }

    fn scaled(dpf: &Rdpf, leaf: &Leaf, lane: usize) -> Self {
        Node {
            key: dpf.scaled_as(leaf, lane),
            pointers: dpf.scaled_xs(leaf, lane + 1),
            value: dpf.scaled_xs(leaf, lane + 2),
        }
    }

    fn scale_share(dpf: &Rdpf, lane: usize) -> Self {
        Node {
            key: dpf.scaled_sum[lane],
            pointers: dpf.scaled_xor[lane + 1],
            value: dpf.scaled_xor[lane + 2],
        }
    }

    fn unit_times(dpf: &Rdpf, leaf: &Leaf, v: &Self) -> Self {
        let ext = dpf.unit_xs(leaf).xshare;
        Node {
            key: RegAS::from_share(dpf.unit_as(leaf).ashare.wrapping_mul(v.key.ashare)),
            pointers: RegXS::from_share(ext & v.pointers.xshare),
            value: RegXS::from_share(ext & v.value.xshare),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        Wire::write(&self.key, out);
        Wire::write(&self.pointers, out);
        Wire::write(&self.value, out);
    }

    fn read(buf: &[u8]) -> Self {
        Node {
            key: <RegAS as Wire>::read(&buf[0..8]),
            pointers: <RegXS as Wire>::read(&buf[8..16]),
            value: <RegXS as Wire>::read(&buf[16..24]),
        }
    }
}

// Pointer-word accessors. All of these shuffle bits of an XOR share and
// are local.

pub fn left_ptr(p: RegXS) -> RegXS {
    RegXS::from_share((p.xshare >> LEFT_SHIFT) & PTR_MASK)
}

pub fn right_ptr(p: RegXS) -> RegXS {
    RegXS::from_share((p.xshare >> RIGHT_SHIFT) & PTR_MASK)
}

pub fn set_left_ptr(p: &mut RegXS, v: RegXS) {
    p.xshare = (p.xshare & !(PTR_MASK << LEFT_SHIFT)) | ((v.xshare & PTR_MASK) << LEFT_SHIFT);
}

pub fn set_right_ptr(p: &mut RegXS, v: RegXS) {
    p.xshare = (p.xshare & !(PTR_MASK << RIGHT_SHIFT)) | ((v.xshare & PTR_MASK) << RIGHT_SHIFT);
}

pub fn left_bal(p: RegXS) -> RegBS {
    p.bit(1)
}

pub fn right_bal(p: RegXS) -> RegBS {
    p.bit(0)
}

pub fn set_left_bal(p: &mut RegXS, b: RegBS) {
    p.xshare = (p.xshare & !2) | ((b.bshare as u64) << 1);
}

pub fn set_right_bal(p: &mut RegXS, b: RegBS) {
    p.xshare = (p.xshare & !1) | (b.bshare as u64);
}

/// Accumulated along an insert's unwind: everything the single rotation
/// at the (unique) imbalance point will need.
#[derive(Clone, Copy, Debug, Default)]
struct InsertRet {
    gp_node: RegXS,
    p_node: RegXS,
    c_node: RegXS,
    dir_gpp: RegBS,
    dir_pc: RegBS,
    dir_cn: RegBS,
    imbalance: RegBS,
}

/// Accumulated along a delete's unwind.
#[derive(Clone, Copy, Debug, Default)]
struct DelRet {
    /// The node holding the key to delete.
    n_d: RegXS,
    /// Its in-order successor, if a two-child delete needed one.
    n_s: RegXS,
    /// Did a successor swap happen?
    f_ss: RegBS,
    /// Must the parent rewire its child pointer?
    f_r: RegBS,
    /// The pointer value to rewire with.
    ret_ptr: RegXS,
}

pub struct Avl {
    oram: Duoram<Node>,
    root: RegXS,
    pub num_items: usize,
    /// Slots freed by deletions, reused by later inserts.
    empty_locations: Vec<RegXS>,
    /// High-water mark for fresh slot allocation.
    next_slot: usize,
}

/// The AVL height bound: no descent needs more than this many levels.
fn height_bound(num_items: usize) -> usize {
    (1.44 * ((num_items + 2) as f64).log2()).ceil() as usize
}

async fn read_node(
    tio: &mut MpcTio,
    oram: &mut Duoram<Node>,
    flat: &Flat,
    ptr: RegXS,
) -> Result<Node> {
    let bundle = RdpfBundle::fetch(tio, flat.addr_bits(), 3).await?;
    read(tio, oram, flat, IndexShare::Xs(ptr), &bundle).await
}

async fn update_node(
    tio: &mut MpcTio,
    oram: &mut Duoram<Node>,
    flat: &Flat,
    ptr: RegXS,
    delta: Node,
) -> Result<()> {
    let bundle = RdpfBundle::fetch(tio, flat.addr_bits(), 3).await?;
    update(tio, oram, flat, IndexShare::Xs(ptr), &bundle, delta).await
}

async fn write_pointers(
    tio: &mut MpcTio,
    oram: &mut Duoram<Node>,
    flat: &Flat,
    ptr: RegXS,
    new_ptrs: RegXS,
    orig_ptrs: RegXS,
) -> Result<()> {
    let delta = Node {
        key: RegAS::default(),
        pointers: new_ptrs ^ orig_ptrs,
        value: RegXS::default(),
    };
    update_node(tio, oram, flat, ptr, delta).await
}

/// Compare a stored key against a probe key. Returns
/// (`[probe <= stored]`, `[probe > stored]`): the second is the descend-
/// right bit.
async fn compare_keys(
    tio: &mut MpcTio,
    stored: RegAS,
    probe: RegAS,
) -> Result<(RegBS, RegBS)> {
    let cdpf = Cdpf::fetch(tio).await?;
    let (lt, eq, gt) = cdpf.compare(tio, probe - stored).await?;
    Ok((lt ^ eq, gt))
}

/// Rotate the p -> c link (gp is p's parent, if one exists):
///
/// ```text
///  gp            gp            gp            gp
///    \             \             \             \
///     p    -L->     c             p    -R->     c
///      \           /             /               \
///       c         p             c                 p
/// ```
///
/// All three pointer words are rewritten under flags; `is_real` gates the
/// whole rotation and `f_gp` suppresses the gp link update when the
/// parent is the root.
#[allow(clippy::too_many_arguments)]
async fn rotate(
    tio: &mut MpcTio,
    gp_pointers: &mut RegXS,
    p_ptr: RegXS,
    p_pointers: &mut RegXS,
    c_ptr: RegXS,
    c_pointers: &mut RegXS,
    dir_gpp: RegBS,
    dir_pc: RegBS,
    is_real: RegBS,
    f_gp: RegBS,
) -> Result<()> {
    let player0 = tio.player() == 0;
    let mut gp_left = left_ptr(*gp_pointers);
    let mut gp_right = right_ptr(*gp_pointers);
    let mut p_left = left_ptr(*p_pointers);
    let mut p_right = right_ptr(*p_pointers);
    let mut c_left = left_ptr(*c_pointers);
    let mut c_right = right_ptr(*c_pointers);

    // If f_gp there is no grandparent (p is the root) and the gp -> p
    // link must not be touched.
    let mut not_f_gp = f_gp;
    if player0 {
        not_f_gp.bshare ^= true;
    }
    let f_gpp = and(tio, not_f_gp, is_real).await?;

    // i) gp[dir_gpp] <- c_ptr
    let ptr_upd = select_xs(tio, f_gpp, p_ptr, c_ptr).await?;
    let f_gppr = and(tio, f_gpp, dir_gpp).await?;
    gp_right = select_xs(tio, f_gppr, gp_right, ptr_upd).await?;
    let mut not_dir_gpp = dir_gpp;
    if player0 {
        not_dir_gpp.bshare ^= true;
    }
    let f_gppl = and(tio, f_gpp, not_dir_gpp).await?;
    gp_left = select_xs(tio, f_gppl, gp_left, ptr_upd).await?;
    set_left_ptr(gp_pointers, gp_left);
    set_right_ptr(gp_pointers, gp_right);

    // ii) p[dir_pc] <- c[!dir_pc] and iii) c[!dir_pc] <- p_ptr
    let mut not_dir_pc = dir_pc;
    if player0 {
        not_dir_pc.bshare ^= true;
    }
    let f_ndpc_right = and(tio, is_real, not_dir_pc).await?;
    let mut c_not_dir_pc = RegXS::default();
    c_not_dir_pc = select_xs(tio, f_ndpc_right, c_not_dir_pc, c_right).await?;
    let f_ndpc_left = and(tio, is_real, dir_pc).await?;
    c_not_dir_pc = select_xs(tio, f_ndpc_left, c_not_dir_pc, c_left).await?;

    p_left = select_xs(tio, f_ndpc_right, p_left, c_not_dir_pc).await?;
    p_right = select_xs(tio, f_ndpc_left, p_right, c_not_dir_pc).await?;
    set_left_ptr(p_pointers, p_left);
    set_right_ptr(p_pointers, p_right);

    let ptr_upd = select_xs(tio, is_real, c_not_dir_pc, p_ptr).await?;
    let f_pc = and(tio, dir_pc, is_real).await?;
    c_left = select_xs(tio, f_pc, c_left, ptr_upd).await?;
    let f_pc = and(tio, not_dir_pc, is_real).await?;
    c_right = select_xs(tio, f_pc, c_right, ptr_upd).await?;
    set_left_ptr(c_pointers, c_left);
    set_right_ptr(c_pointers, c_right);
    Ok(())
}

/// Propagate a height-increase bit up through a node on the insert
/// unwind. Conceptually the state (imbalance, bal_l, balanced, bal_r)
/// shifts right when the taller child is the right one and left when it
/// is the left one; an extracted imbalance bit means the balance would
/// have reached ±2. Returns (bal_l, bal_r, bal_upd, imbalance).
async fn update_balance_ins(
    tio: &mut MpcTio,
    bal_l: RegBS,
    bal_r: RegBS,
    bal_upd: RegBS,
    child_dir: RegBS,
) -> Result<(RegBS, RegBS, RegBS, RegBS)> {
    let player0 = tio.player() == 0;
    let s0 = RegBS::default();
    let mut bal_l = bal_l;
    let mut bal_r = bal_r;
    let mut bal_upd = bal_upd;
    let mut child_dir = child_dir;

    let mut balanced = bal_l ^ bal_r;
    let f_rs = and(tio, child_dir, bal_upd).await?;
    if player0 {
        child_dir.bshare ^= true;
        balanced.bshare ^= true;
    }
    let f_ls = and(tio, child_dir, bal_upd).await?;

    let mut imbalance = RegBS::default();
    // Right shift if the insert went right and the subtree grew.
    imbalance = select_bs(tio, f_rs, imbalance, bal_r).await?;
    bal_r = select_bs(tio, f_rs, bal_r, balanced).await?;
    balanced = select_bs(tio, f_rs, balanced, bal_l).await?;
    bal_l = select_bs(tio, f_rs, bal_l, s0).await?;

    // Left shift if it went left.
    imbalance = select_bs(tio, f_ls, imbalance, bal_l).await?;
    bal_l = select_bs(tio, f_ls, bal_l, balanced).await?;
    balanced = select_bs(tio, f_ls, balanced, bal_r).await?;
    bal_r = select_bs(tio, f_ls, bal_r, s0).await?;

    // The height update stops where the node was balanced, and an
    // imbalance is resolved by the rotation, so clear bal_upd in both
    // cases.
    let f_bu0 = and(tio, bal_upd, balanced).await?;
    bal_upd = select_bs(tio, f_bu0, bal_upd, s0).await?;
    bal_upd = select_bs(tio, imbalance, bal_upd, s0).await?;
    Ok((bal_l, bal_r, bal_upd, imbalance))
}

/// The delete-side counterpart: a `bal_upd` from a child means that
/// child's height *decreased*, so the shift directions are inverted.
async fn update_balance_del(
    tio: &mut MpcTio,
    bal_l: RegBS,
    bal_r: RegBS,
    bal_upd: RegBS,
    child_dir: RegBS,
) -> Result<(RegBS, RegBS, RegBS, RegBS)> {
    let player0 = tio.player() == 0;
    let s0 = RegBS::default();
    let mut bal_l = bal_l;
    let mut bal_r = bal_r;
    let mut bal_upd = bal_upd;
    let mut child_dir = child_dir;

    let mut balanced = bal_l ^ bal_r;
    let f_ls = and(tio, child_dir, bal_upd).await?;
    if player0 {
        child_dir.bshare ^= true;
        balanced.bshare ^= true;
    }
    let f_rs = and(tio, child_dir, bal_upd).await?;

    let mut imbalance = RegBS::default();
    imbalance = select_bs(tio, f_ls, imbalance, bal_l).await?;
    bal_l = select_bs(tio, f_ls, bal_l, balanced).await?;
    balanced = select_bs(tio, f_ls, balanced, bal_r).await?;
    bal_r = select_bs(tio, f_ls, bal_r, s0).await?;

    imbalance = select_bs(tio, f_rs, imbalance, bal_r).await?;
    bal_r = select_bs(tio, f_rs, bal_r, balanced).await?;
    balanced = select_bs(tio, f_rs, balanced, bal_l).await?;
    bal_l = select_bs(tio, f_rs, bal_l, s0).await?;

    // A node that ends up merely tipped to one side keeps its subtree
    // height, so the decrease stops there; one that ends balanced lost
    // a level and keeps propagating, as does an imbalance (the rotation
    // code clears bal_upd itself in the height-preserving IC2 case).
    let mut not_imbalance = imbalance;
    if player0 {
        not_imbalance.bshare ^= true;
    }
    let tipped = bal_l ^ bal_r;
    let bu0 = and(tio, bal_upd, not_imbalance).await?;
    let bu0 = and(tio, bu0, tipped).await?;
    bal_upd = select_bs(tio, bu0, bal_upd, s0).await?;
    Ok((bal_l, bal_r, bal_upd, imbalance))
}

type BoxedResult<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

#[allow(clippy::too_many_arguments)]
fn insert_rec<'a>(
    tio: &'a mut MpcTio,
    oram: &'a mut Duoram<Node>,
    flat: Flat,
    ptr: RegXS,
    ins_addr: RegXS,
    insert_key: RegAS,
    ttl: usize,
    is_dummy: RegBS,
    ret: &'a mut InsertRet,
) -> BoxedResult<'a, (RegBS, RegBS, RegXS, RegBS)> {
    Box::pin(async move {
        if ttl == 0 {
            return Ok(Default::default());
        }
        let is_real = RegBS::from_share(is_dummy.bshare ^ (tio.player() == 1));
        let cnode = read_node(tio, oram, &flat, ptr).await?;
        let (lteq, gt) = compare_keys(tio, cnode.key, insert_key).await?;

        let left = left_ptr(cnode.pointers);
        let right = right_ptr(cnode.pointers);
        let bal_l = left_bal(cnode.pointers);
        let bal_r = right_bal(cnode.pointers);
        let next_ptr = select_xs(tio, gt, left, right).await?;

        // The end of the path: the chosen child pointer is NULL and this
        // call is still real. That is where the new node hangs.
        let cdpf = Cdpf::fetch(tio).await?;
        let f_z = cdpf.is_zero(tio, next_ptr).await?;
        let f_i = and(tio, is_real, f_z).await?;

        let (bal_upd, f_gp_in, prev_node, prev_dir) = insert_rec(
            tio,
            oram,
            flat,
            next_ptr,
            ins_addr,
            insert_key,
            ttl - 1,
            is_dummy ^ f_i,
            ret,
        )
        .await?;

        // If we inserted at this level the subtree below got taller.
        let bal_upd = or(tio, bal_upd, f_i).await?;
        let (new_bal_l, new_bal_r, new_bal_upd, imbalance) =
            update_balance_ins(tio, bal_l, bal_r, bal_upd, gt).await?;
        ret.imbalance ^= imbalance;

        // Latch grandparent / parent / child records for the rotation.
        ret.gp_node = select_xs(tio, f_gp_in, ret.gp_node, ptr).await?;
        ret.dir_gpp = select_bs(tio, f_gp_in, ret.dir_gpp, gt).await?;
        ret.p_node = select_xs(tio, imbalance, ret.p_node, ptr).await?;
        ret.dir_pc = select_bs(tio, imbalance, ret.dir_pc, gt).await?;
        ret.c_node = select_xs(tio, imbalance, ret.c_node, prev_node).await?;
        ret.dir_cn = select_bs(tio, imbalance, ret.dir_cn, prev_dir).await?;

        // Write back balances, and the new child pointer if the insert
        // landed here.
        let mut pointers = cnode.pointers;
        set_left_bal(&mut pointers, new_bal_l);
        set_right_bal(&mut pointers, new_bal_r);
        let f_ir = and(tio, f_i, gt).await?;
        let f_il = and(tio, f_i, lteq).await?;
        let left2 = select_xs(tio, f_il, left, ins_addr).await?;
        let right2 = select_xs(tio, f_ir, right, ins_addr).await?;
        set_left_ptr(&mut pointers, left2);
        set_right_ptr(&mut pointers, right2);
        write_pointers(tio, oram, &flat, ptr, pointers, cnode.pointers).await?;

        // Tell the caller to record itself as the grandparent exactly
        // when the imbalance is here.
        Ok((new_bal_upd, imbalance, ptr, gt))
    })
}

impl Avl {
    pub fn new(player: u8, size: usize) -> Self {
        Avl {
            oram: Duoram::new(player, size),
            root: RegXS::default(),
            num_items: 0,
            empty_locations: Vec::new(),
            next_slot: 1,
        }
    }

    fn flat(&self) -> Flat {
        Flat::whole(self.oram.size())
    }

    /// This party's share of the root index.
    pub fn root_share(&self) -> RegXS {
        self.root
    }

    /// Insert a node (its pointer word is ignored and zeroed).
    pub async fn insert(&mut self, tio: &mut MpcTio, node: Node) -> Result<()> {
        let flat = self.flat();
        let mut node = node;
        node.pointers = RegXS::default();

        if self.num_items == 0 {
            // Everything previously freed was zeroed on deletion; start
            // the slot allocator over.
            self.empty_locations.clear();
            explicit_write(tio, &mut self.oram, &flat, 1, node).await?;
            self.root = RegXS::from_share(if tio.player() == 1 { 1 } else { 0 });
            self.num_items = 1;
            self.next_slot = 2;
            return Ok(());
        }

        self.num_items += 1;
        let ttl = height_bound(self.num_items);
        debug!(num_items = self.num_items, ttl, "avl insert");

        let insert_address = match self.empty_locations.pop() {
            Some(addr) => {
                // The freed slot may hold stale contents; replace them.
                let current = read_node(tio, &mut self.oram, &flat, addr).await?;
                let mut delta = node;
                delta.sub(&current);
                update_node(tio, &mut self.oram, &flat, addr, delta).await?;
                addr
            }
            None => {
                let new_id = self.next_slot;
                self.next_slot += 1;
                explicit_write(tio, &mut self.oram, &flat, new_id, node).await?;
                RegXS::from_share(if tio.player() == 1 { new_id as u64 } else { 0 })
            }
        };

        let mut ret = InsertRet::default();
        let (_bal_upd, f_gp, _prev_node, _prev_dir) = insert_rec(
            tio,
            &mut self.oram,
            flat,
            self.root,
            insert_address,
            node.key,
            ttl,
            RegBS::default(),
            &mut ret,
        )
        .await?;

        self.insert_fixup(tio, ret, f_gp).await
    }

    /// The single- or double-rotation at the unwind's imbalance point
    /// (a dummy rotation when there was none).
    async fn insert_fixup(&mut self, tio: &mut MpcTio, ret: InsertRet, f_gp: RegBS) -> Result<()> {
        let flat = self.flat();
        let player0 = tio.player() == 0;
        let s0 = RegBS::default();

        let gp_node = read_node(tio, &mut self.oram, &flat, ret.gp_node).await?;
        let p_node = read_node(tio, &mut self.oram, &flat, ret.p_node).await?;
        let c_node = read_node(tio, &mut self.oram, &flat, ret.c_node).await?;
        let mut gp_pointers = gp_node.pointers;
        let mut parent_pointers = p_node.pointers;
        let mut child_pointers = c_node.pointers;

        // n: the child's next node along the insertion path.
        let child_left = left_ptr(child_pointers);
        let child_right = right_ptr(child_pointers);
        let mut n_node = RegXS::default();
        n_node = select_xs(tio, ret.dir_cn, n_node, child_right).await?;
        let mut not_dir_cn = ret.dir_cn;
        if player0 {
            not_dir_cn.bshare ^= true;
        }
        n_node = select_xs(tio, not_dir_cn, n_node, child_left).await?;
        let n_cell = read_node(tio, &mut self.oram, &flat, n_node).await?;
        let mut n_pointers = n_cell.pointers;

        // Double rotation (LR/RL) when the two lower links disagree.
        let f_dr = ret.dir_pc ^ ret.dir_cn;
        let mut f_ur = and(tio, f_gp, ret.imbalance).await?;
        let f_cn_rot = and(tio, ret.imbalance, f_dr).await?;

        // n's children, before anything rotates: the double-rotation
        // balance fix consults them.
        let n_l = left_ptr(n_pointers);
        let n_r = right_ptr(n_pointers);
        let mut n_bal_l = left_bal(n_pointers);
        let mut n_bal_r = right_bal(n_pointers);

        // First rotation: the c -> n link.
        rotate(
            tio,
            &mut parent_pointers,
            ret.c_node,
            &mut child_pointers,
            n_node,
            &mut n_pointers,
            ret.dir_pc,
            ret.dir_cn,
            f_cn_rot,
            s0,
        )
        .await?;

        // After a first rotation, c and n have swapped positions.
        let mut new_child_pointers =
            select_xs(tio, f_cn_rot, child_pointers, n_pointers).await?;
        let new_child = select_xs(tio, f_cn_rot, ret.c_node, n_node).await?;

        // Second rotation: the p -> c link.
        rotate(
            tio,
            &mut gp_pointers,
            ret.p_node,
            &mut parent_pointers,
            new_child,
            &mut new_child_pointers,
            ret.dir_gpp,
            ret.dir_pc,
            ret.imbalance,
            f_gp,
        )
        .await?;

        let mut p_bal_l = left_bal(parent_pointers);
        let mut p_bal_r = right_bal(parent_pointers);

        child_pointers = select_xs(tio, f_cn_rot, new_child_pointers, child_pointers).await?;
        n_pointers = select_xs(tio, f_cn_rot, n_pointers, new_child_pointers).await?;

        let mut c_bal_l = left_bal(child_pointers);
        let mut c_bal_r = right_bal(child_pointers);
        c_bal_l = select_bs(tio, ret.imbalance, c_bal_l, s0).await?;
        c_bal_r = select_bs(tio, ret.imbalance, c_bal_r, s0).await?;

        // Double-rotation case analysis: if n has children, the balance
        // of p and c depends on which side of n the insertion came up.
        let cdpf = Cdpf::fetch(tio).await?;
        let n_l0 = cdpf.is_zero(tio, n_l).await?;
        let cdpf = Cdpf::fetch(tio).await?;
        let n_r0 = cdpf.is_zero(tio, n_r).await?;
        let mut n_has_children = and(tio, n_l0, n_r0).await?;
        if player0 {
            n_has_children.bshare ^= true;
        }
        let p_c_update = and(tio, f_cn_rot, n_has_children).await?;

        let mut n_bal_ndpc = select_bs(tio, ret.dir_pc, n_bal_r, n_bal_l).await?;
        let mut n_bal_dpc = select_bs(tio, ret.dir_pc, n_bal_l, n_bal_r).await?;
        let mut p_bal_ndpc = select_bs(tio, ret.dir_pc, p_bal_r, p_bal_l).await?;
        if player0 {
            n_bal_ndpc.bshare ^= true;
            n_bal_dpc.bshare ^= true;
        }
        p_bal_ndpc = select_bs(tio, p_c_update, p_bal_ndpc, n_bal_ndpc).await?;
        let mut c_bal_dpc = RegBS::default();
        c_bal_dpc = select_bs(tio, p_c_update, c_bal_dpc, n_bal_dpc).await?;

        p_bal_r = select_bs(tio, ret.dir_pc, p_bal_ndpc, p_bal_r).await?;
        p_bal_l = select_bs(tio, ret.dir_pc, p_bal_l, p_bal_ndpc).await?;
        c_bal_r = select_bs(tio, ret.dir_pc, c_bal_r, c_bal_dpc).await?;
        c_bal_l = select_bs(tio, ret.dir_pc, c_bal_dpc, c_bal_l).await?;

        set_left_bal(&mut parent_pointers, p_bal_l);
        set_right_bal(&mut parent_pointers, p_bal_r);
        set_left_bal(&mut child_pointers, c_bal_l);
        set_right_bal(&mut child_pointers, c_bal_r);

        // After a double rotation n ends up balanced; otherwise its
        // balance is untouched by an insert rotation.
        n_bal_l = select_bs(tio, f_cn_rot, n_bal_l, s0).await?;
        n_bal_r = select_bs(tio, f_cn_rot, n_bal_r, s0).await?;
        set_left_bal(&mut n_pointers, n_bal_l);
        set_right_bal(&mut n_pointers, n_bal_r);

        write_pointers(tio, &mut self.oram, &flat, ret.c_node, child_pointers, c_node.pointers)
            .await?;
        write_pointers(
            tio,
            &mut self.oram,
            &flat,
            ret.p_node,
            parent_pointers,
            p_node.pointers,
        )
        .await?;
        write_pointers(tio, &mut self.oram, &flat, ret.gp_node, gp_pointers, gp_node.pointers)
            .await?;
        write_pointers(tio, &mut self.oram, &flat, n_node, n_pointers, n_cell.pointers).await?;

        // If the imbalance was at the root, the root moved: to c after a
        // single rotation, to n after a double one.
        self.root = select_xs(tio, f_ur, self.root, ret.c_node).await?;
        f_ur = and(tio, f_gp, f_dr).await?;
        self.root = select_xs(tio, f_ur, self.root, n_node).await?;
        Ok(())
    }

    /// Look a key up. The returned bool is the reconstructed `found`
    /// bit (public to all three parties); the node's key and value are
    /// fresh shares, all-zero when not found.
    pub async fn lookup(&mut self, tio: &mut MpcTio, key: RegAS) -> Result<(bool, Node)> {
        let flat = self.flat();
        let ttl = height_bound(self.num_items);
        let mut ret_node = Node::default();
        let found = lookup_rec(
            tio,
            &mut self.oram,
            flat,
            self.root,
            key,
            ttl,
            RegBS::default(),
            &mut ret_node,
        )
        .await?;
        Ok((found, ret_node))
    }

    /// Delete a key. Returns the reconstructed success bit; deleting an
    /// absent key returns false and changes nothing.
    pub async fn delete(&mut self, tio: &mut MpcTio, del_key: RegAS) -> Result<bool> {
        let flat = self.flat();
        if self.num_items == 0 {
            return Ok(false);
        }
        if self.num_items == 1 {
            let node = read_node(tio, &mut self.oram, &flat, self.root).await?;
            let cdpf = Cdpf::fetch(tio).await?;
            let (_lt, eq, _gt) = cdpf.compare(tio, del_key - node.key).await?;
            let success = reconstruct_bs(tio, eq).await?;
            if success {
                self.empty_locations.push(self.root);
                update_node(tio, &mut self.oram, &flat, self.root, node.neg()).await?;
                self.root = RegXS::default();
                self.num_items -= 1;
            }
            return Ok(success);
        }

        let ttl = height_bound(self.num_items);
        debug!(num_items = self.num_items, ttl, "avl delete");
        let mut ret = DelRet::default();
        let (success, _bal_upd) = del_rec(
            tio,
            &mut self.oram,
            flat,
            self.root,
            del_key,
            RegBS::default(),
            RegBS::default(),
            ttl,
            &mut ret,
        )
        .await?;
        if !success {
            return Ok(false);
        }
        self.num_items -= 1;

        let del_node = read_node(tio, &mut self.oram, &flat, ret.n_d).await?;
        let suc_node = read_node(tio, &mut self.oram, &flat, ret.n_s).await?;

        // If the parent of the deleted (or rotated) node must rewire,
        // the top-level F_r means the root itself moved.
        self.root = select_xs(tio, ret.f_r, self.root, ret.ret_ptr).await?;

        // Successor swap: the successor's key and value move into the
        // deleted node's slot, and the successor's slot is cleared.
        let new_key = select(tio, ret.f_ss, del_node.key, suc_node.key, 64).await?;
        let new_value = select_xs(tio, ret.f_ss, del_node.value, suc_node.value).await?;
        update_node(
            tio,
            &mut self.oram,
            &flat,
            ret.n_d,
            Node {
                key: new_key - del_node.key,
                pointers: RegXS::default(),
                value: new_value ^ del_node.value,
            },
        )
        .await?;
        update_node(tio, &mut self.oram, &flat, ret.n_s, suc_node.neg()).await?;

        let empty_loc = select_xs(tio, ret.f_ss, ret.n_d, ret.n_s).await?;
        self.empty_locations.push(empty_loc);
        Ok(true)
    }

    /// Reconstruct the whole arena and root, and check the BST and AVL
    /// invariants. Test harness only; returns (bst_ok, avl_ok, height),
    /// trivially ok at the server.
    pub async fn check_avl(&mut self, tio: &mut MpcTio) -> Result<(bool, bool, usize)> {
        let flat = self.flat();
        let nodes = reconstruct(tio, &self.oram, &flat).await?;
        let root = trioram_mpc::reconstruct_xs(tio, self.root, 64).await?;
        if tio.is_server() {
            return Ok((true, true, 0));
        }
        fn walk(
            nodes: &[Node],
            at: u64,
            min_key: u64,
            max_key: u64,
        ) -> (bool, bool, usize) {
            if at == 0 {
                return (true, true, 0);
            }
            let n = &nodes[at as usize];
            let key = n.key.ashare;
            let left = (n.pointers.xshare >> LEFT_SHIFT) & PTR_MASK;
            let right = (n.pointers.xshare >> RIGHT_SHIFT) & PTR_MASK;
            let (lb, la, lh) = walk(nodes, left, min_key, key);
            let (rb, ra, rh) = walk(nodes, right, key.saturating_add(1), max_key);
            let height = lh.max(rh) + 1;
            let bst_ok = lb && rb && key >= min_key && key <= max_key;
            let avl_ok = la && ra && lh.abs_diff(rh) < 2;
            (bst_ok, avl_ok, height)
        }
        Ok(walk(&nodes, root, 0, u64::MAX))
    }

    /// Reconstructed (key, left, right, bal_l, bal_r) rows of the
    /// reachable tree in-order, for tests.
    pub async fn reconstruct_tree(
        &mut self,
        tio: &mut MpcTio,
    ) -> Result<Vec<(u64, u64, u64, bool, bool)>> {
        let flat = self.flat();
        let nodes = reconstruct(tio, &self.oram, &flat).await?;
        let root = trioram_mpc::reconstruct_xs(tio, self.root, 64).await?;
        let mut out = Vec::new();
        if tio.is_server() {
            return Ok(out);
        }
        fn walk(nodes: &[Node], at: u64, out: &mut Vec<(u64, u64, u64, bool, bool)>) {
            if at == 0 {
                return;
            }
            let n = &nodes[at as usize];
            let left = (n.pointers.xshare >> LEFT_SHIFT) & PTR_MASK;
            let right = (n.pointers.xshare >> RIGHT_SHIFT) & PTR_MASK;
            walk(nodes, left, out);
            out.push((
                n.key.ashare,
                left,
                right,
                n.pointers.xshare & 2 != 0,
                n.pointers.xshare & 1 != 0,
            ));
            walk(nodes, right, out);
        }
        walk(&nodes, root, &mut out);
        Ok(out)
    }
}

#[allow(clippy::too_many_arguments)]
fn lookup_rec<'a>(
    tio: &'a mut MpcTio,
    oram: &'a mut Duoram<Node>,
    flat: Flat,
    ptr: RegXS,
    key: RegAS,
    ttl: usize,
    is_dummy: RegBS,
    ret_node: &'a mut Node,
) -> BoxedResult<'a, bool> {
    Box::pin(async move {
        if ttl == 0 {
            // If we found the key along the way, is_dummy was toggled.
            return reconstruct_bs(tio, is_dummy).await;
        }
        let is_not_dummy = RegBS::from_share(is_dummy.bshare ^ (tio.player() == 1));
        let cnode = read_node(tio, oram, &flat, ptr).await?;
        let cdpf = Cdpf::fetch(tio).await?;
        let (_lt, eq, gt) = cdpf.compare(tio, key - cnode.key).await?;

        let left = left_ptr(cnode.pointers);
        let right = right_ptr(cnode.pointers);
        let next_ptr = select_xs(tio, gt, left, right).await?;

        let f_found = and(tio, is_not_dummy, eq).await?;
        ret_node.key = select(tio, eq, ret_node.key, cnode.key, 64).await?;
        ret_node.value = select_xs(tio, eq, ret_node.value, cnode.value).await?;

        lookup_rec(tio, oram, flat, next_ptr, key, ttl - 1, is_dummy ^ f_found, ret_node).await
    })
}

/// Resolve a child-pointer rewrite requested from below (`ret.f_r`):
/// the child in the traversal direction is replaced by `ret.ret_ptr`.
async fn update_child_pointers(
    tio: &mut MpcTio,
    left: &mut RegXS,
    right: &mut RegXS,
    c_prime: RegBS,
    ret: &DelRet,
) -> Result<()> {
    let player0 = tio.player() == 0;
    let f_rr = and(tio, c_prime, ret.f_r).await?;
    *right = select_xs(tio, f_rr, *right, ret.ret_ptr).await?;
    let mut not_c_prime = c_prime;
    if player0 {
        not_c_prime.bshare ^= true;
    }
    let f_rl = and(tio, not_c_prime, ret.f_r).await?;
    *left = select_xs(tio, f_rl, *left, ret.ret_ptr).await?;
    Ok(())
}

/// Rotate away an imbalance on the delete unwind (or do the dummy
/// work). `cs_ptr` is the sibling of the shrunk child; a double rotation
/// happens when it leans toward the shrunk side. Writes this node's, the
/// sibling's and the grandchild-sibling's pointer words; returns `F_ri`,
/// the flag telling the caller the child in its direction was replaced
/// by a rotation.
#[allow(clippy::too_many_arguments)]
async fn fix_imbalance(
    tio: &mut MpcTio,
    oram: &mut Duoram<Node>,
    flat: Flat,
    ptr: RegXS,
    nodeptrs: RegXS,
    orig_nodeptrs: RegXS,
    new_p_bal_l: RegBS,
    new_p_bal_r: RegBS,
    bal_upd: &mut RegBS,
    c_prime: RegBS,
    cs_ptr: RegXS,
    imb: RegBS,
    ret: &mut DelRet,
) -> Result<RegBS> {
    let player0 = tio.player() == 0;
    let s0 = RegBS::default();
    let s1 = RegBS::from_share(tio.player() == 1);
    let mut nodeptrs = nodeptrs;
    let mut new_p_bal_l = new_p_bal_l;
    let mut new_p_bal_r = new_p_bal_r;

    let cs_cell = read_node(tio, oram, &flat, cs_ptr).await?;
    let mut cs_pointers = cs_cell.pointers;
    let cs_bal_l = left_bal(cs_pointers);
    let cs_bal_r = right_bal(cs_pointers);
    let cs_left = left_ptr(cs_pointers);
    let cs_right = right_ptr(cs_pointers);
    let mut cs_bal_dpc = select_bs(tio, c_prime, cs_bal_l, cs_bal_r).await?;
    let mut cs_bal_ndpc = select_bs(tio, c_prime, cs_bal_r, cs_bal_l).await?;
    let cs_dpc = select_xs(tio, c_prime, cs_left, cs_right).await?;
    let cs_ndpc = select_xs(tio, c_prime, cs_right, cs_left).await?;

    // Double rotation when the sibling leans toward the traversal side;
    // the grandchild on that side comes up.
    let f_dr = and(tio, imb, cs_bal_dpc).await?;
    let gcs_ptr = select_xs(tio, cs_bal_dpc, cs_ndpc, cs_dpc).await?;
    let gcs_cell = read_node(tio, oram, &flat, gcs_ptr).await?;
    let mut gcs_pointers = gcs_cell.pointers;
    // Captured before the rotations: the balance fix consults them.
    let gcs_bal_l_pre = left_bal(gcs_pointers);
    let gcs_bal_r_pre = right_bal(gcs_pointers);

    let mut not_c_prime = c_prime;
    if player0 {
        not_c_prime.bshare ^= true;
    }

    // First rotation: the cs -> gcs link.
    rotate(
        tio,
        &mut nodeptrs,
        cs_ptr,
        &mut cs_pointers,
        gcs_ptr,
        &mut gcs_pointers,
        not_c_prime,
        c_prime,
        f_dr,
        s0,
    )
    .await?;

    let mut new_cs_pointers = select_xs(tio, f_dr, cs_pointers, gcs_pointers).await?;
    let new_cs = select_xs(tio, f_dr, cs_ptr, gcs_ptr).await?;

    // Second rotation: the p -> cs link. There is no grandparent in
    // scope here; the parent will rewire via F_r and ret_ptr instead.
    let mut null = RegXS::default();
    rotate(
        tio,
        &mut null,
        ptr,
        &mut nodeptrs,
        new_cs,
        &mut new_cs_pointers,
        s0,
        not_c_prime,
        imb,
        s1,
    )
    .await?;

    // Tell the parent which node now heads this subtree.
    let new_ptr = select_xs(tio, f_dr, cs_ptr, gcs_ptr).await?;
    let f_ri = select_bs(tio, imb, s0, s1).await?;
    ret.ret_ptr = select_xs(tio, imb, ret.ret_ptr, new_ptr).await?;

    // Put the rotated words back with the right owners.
    cs_pointers = select_xs(tio, f_dr, new_cs_pointers, cs_pointers).await?;
    gcs_pointers = select_xs(tio, f_dr, gcs_pointers, new_cs_pointers).await?;

    // The three imbalance cases, by the sibling's pre-rotation balance:
    // away from the traversal side (IC1), balanced (IC2), toward it
    // (IC3, the double rotation).
    let ic1 = and(tio, imb, cs_bal_ndpc).await?;
    let ic3 = and(tio, imb, cs_bal_dpc).await?;
    let mut ic2 = ic1 ^ ic3;
    if player0 {
        ic2.bshare ^= true;
    }
    let ic2 = and(tio, imb, ic2).await?;

    // Any rotation rewrites the sibling's balance from scratch.
    cs_bal_dpc = select_bs(tio, imb, cs_bal_dpc, s0).await?;
    cs_bal_ndpc = select_bs(tio, imb, cs_bal_ndpc, s0).await?;

    // IC2: the rotation tips parent and sibling toward each other and
    // the subtree height does not change, so the update stops here.
    let p_bal_ndpc_bit = ic2;
    let cs_bal_dpc_bit = ic2;
    cs_bal_dpc ^= cs_bal_dpc_bit;
    *bal_upd = select_bs(tio, ic2, *bal_upd, s0).await?;

    // IC3: the grandchild's pre-rotation lean decides which of parent
    // and sibling comes out one deep.
    let gcs_bal_dpc_pre = select_bs(tio, c_prime, gcs_bal_l_pre, gcs_bal_r_pre).await?;
    let gcs_bal_ndpc_pre = select_bs(tio, c_prime, gcs_bal_r_pre, gcs_bal_l_pre).await?;
    let p_bal_dpc_bit = and(tio, ic3, gcs_bal_ndpc_pre).await?;
    let cs_bal_ndpc_bit = and(tio, ic3, gcs_bal_dpc_pre).await?;
    cs_bal_ndpc ^= cs_bal_ndpc_bit;

    // Place the direction-relative bits into left/right positions.
    let mut cs_bal_l = select_bs(tio, c_prime, cs_bal_dpc, cs_bal_ndpc).await?;
    let mut cs_bal_r = select_bs(tio, c_prime, cs_bal_ndpc, cs_bal_dpc).await?;
    let p_l_from_ndpc = select_bs(tio, c_prime, s0, p_bal_ndpc_bit).await?;
    let p_r_from_ndpc = select_bs(tio, c_prime, p_bal_ndpc_bit, s0).await?;
    let p_l_from_dpc = select_bs(tio, c_prime, p_bal_dpc_bit, s0).await?;
    let p_r_from_dpc = select_bs(tio, c_prime, s0, p_bal_dpc_bit).await?;
    // The parent's balances were zeroed by the imbalance shift; the
    // case bits xor into place.
    new_p_bal_l ^= p_l_from_ndpc ^ p_l_from_dpc;
    new_p_bal_r ^= p_r_from_ndpc ^ p_r_from_dpc;

    // After any rotation the grandchild ends up balanced.
    let mut gcs_bal_l = gcs_bal_l_pre;
    let mut gcs_bal_r = gcs_bal_r_pre;
    gcs_bal_l = select_bs(tio, ic3, gcs_bal_l, s0).await?;
    gcs_bal_r = select_bs(tio, ic3, gcs_bal_r, s0).await?;

    set_left_bal(&mut gcs_pointers, gcs_bal_l);
    set_right_bal(&mut gcs_pointers, gcs_bal_r);
    set_left_bal(&mut cs_pointers, cs_bal_l);
    set_right_bal(&mut cs_pointers, cs_bal_r);

    write_pointers(tio, oram, &flat, cs_ptr, cs_pointers, cs_cell.pointers).await?;
    write_pointers(tio, oram, &flat, gcs_ptr, gcs_pointers, gcs_cell.pointers).await?;

    set_left_bal(&mut nodeptrs, new_p_bal_l);
    set_right_bal(&mut nodeptrs, new_p_bal_r);
    write_pointers(tio, oram, &flat, ptr, nodeptrs, orig_nodeptrs).await?;
    Ok(f_ri)
}

/// Fold this level's outcome into the delete return record: latch the
/// node to delete at, the successor, and whether and how the parent must
/// rewire its child pointer.
#[allow(clippy::too_many_arguments)]
async fn update_ret_struct(
    tio: &mut MpcTio,
    ptr: RegXS,
    f_2: RegBS,
    f_c2: RegBS,
    f_c4: RegBS,
    lf: RegBS,
    f_ri: RegBS,
    found: RegBS,
    bal_upd: &mut RegBS,
    ret: &mut DelRet,
) -> Result<()> {
    let player0 = tio.player() == 0;
    let s1 = RegBS::from_share(tio.player() == 1);

    ret.f_ss = or(tio, ret.f_ss, f_c2).await?;
    let mut not_found = found;
    if player0 {
        not_found.bshare ^= true;
    }
    // Deleting here, for the first time on this path.
    let f_dh = and(tio, lf, not_found).await?;
    ret.n_d = select_xs(tio, f_dh, ret.n_d, ptr).await?;

    // The successor: the first no-more-left-children node of the
    // successor search.
    let f_sf = f_c4;
    let mut not_f_2 = f_2;
    if player0 {
        not_f_2.bshare ^= true;
    }
    // The parent skips this node if it was deleted with fewer than two
    // children, or if it was the successor (which moves up).
    let mut f_rs = and(tio, f_dh, not_f_2).await?;
    f_rs = or(tio, f_rs, f_sf).await?;
    ret.n_s = select_xs(tio, f_sf, ret.n_s, ptr).await?;

    // F_rs (skip) and F_ri (rotation replaced the subtree head) never
    // fire together; either way ret_ptr already holds the replacement,
    // and otherwise it is this node itself.
    let mut f_nr = or(tio, f_rs, f_ri).await?;
    ret.f_r = f_nr;
    if player0 {
        f_nr.bshare ^= true;
    }
    ret.ret_ptr = select_xs(tio, f_nr, ret.ret_ptr, ptr).await?;

    // Skipping a node shortens the path below the parent.
    *bal_upd = select_bs(tio, f_rs, *bal_upd, s1).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn del_rec<'a>(
    tio: &'a mut MpcTio,
    oram: &'a mut Duoram<Node>,
    flat: Flat,
    ptr: RegXS,
    del_key: RegAS,
    found: RegBS,
    find_successor: RegBS,
    ttl: usize,
    ret: &'a mut DelRet,
) -> BoxedResult<'a, (bool, RegBS)> {
    Box::pin(async move {
        if ttl == 0 {
            let success = reconstruct_bs(tio, found).await?;
            return Ok((success, RegBS::default()));
        }
        let player0 = tio.player() == 0;
        let s0 = RegBS::default();
        let s1 = RegBS::from_share(tio.player() == 1);

        let node = read_node(tio, oram, &flat, ptr).await?;
        let cdpf = Cdpf::fetch(tio).await?;
        let (_lt, eq, gt) = cdpf.compare(tio, del_key - node.key).await?;
        // c: the direction of travel; lf: the key is here.
        let c = gt;
        let lf = eq;

        let mut left = left_ptr(node.pointers);
        let mut right = right_ptr(node.pointers);

        // How many children does this node have?
        let cdpf = Cdpf::fetch(tio).await?;
        let l0 = cdpf.is_zero(tio, left).await?;
        let cdpf = Cdpf::fetch(tio).await?;
        let r0 = cdpf.is_zero(tio, right).await?;
        let f_0 = and(tio, l0, r0).await?;
        let f_1 = l0 ^ r0;
        let mut f_2 = f_0 ^ f_1;
        if player0 {
            f_2.bshare ^= true;
        }

        // Four special steering cases override the comparison result.
        // Case 1: deleting here with one child: continue into it.
        let f_c1 = and(tio, lf, f_1).await?;
        let mut c_prime = select_bs(tio, f_c1, c, l0).await?;
        // Case 2: deleting here with two children: start the successor
        // search to the right.
        let f_c2 = and(tio, lf, f_2).await?;
        c_prime = select_bs(tio, f_c2, c_prime, s1).await?;
        // Case 3: searching for the successor with a left child: keep
        // going left.
        let f_c3 = and(tio, find_successor, f_2).await?;
        c_prime = select_bs(tio, f_c3, c_prime, s0).await?;
        // Case 4: no more left children: this is the successor; its
        // (only possible) child is to the right.
        let f_c4 = and(tio, find_successor, l0).await?;
        c_prime = select_bs(tio, f_c4, c_prime, l0).await?;

        let next_ptr = select_xs(tio, c_prime, left, right).await?;
        let cs_ptr = select_xs(tio, c_prime, right, left).await?;

        let found_prime = or(tio, found, lf).await?;
        let mut find_successor_prime = or(tio, find_successor, f_c2).await?;
        find_successor_prime = find_successor_prime ^ f_c4;

        let (key_found, bal_upd) = del_rec(
            tio,
            oram,
            flat,
            next_ptr,
            del_key,
            found_prime,
            find_successor_prime,
            ttl - 1,
            ret,
        )
        .await?;
        if !key_found {
            return Ok((false, s0));
        }
        let mut bal_upd = bal_upd;

        update_child_pointers(tio, &mut left, &mut right, c_prime, ret).await?;
        let mut nodeptrs = node.pointers;
        set_left_ptr(&mut nodeptrs, left);
        set_right_ptr(&mut nodeptrs, right);
        // The F_r request is resolved; don't resolve it again above.
        ret.f_r = s0;

        let p_bal_l = left_bal(nodeptrs);
        let p_bal_r = right_bal(nodeptrs);
        let (new_p_bal_l, new_p_bal_r, new_bal_upd, imb) =
            update_balance_del(tio, p_bal_l, p_bal_r, bal_upd, c_prime).await?;
        bal_upd = new_bal_upd;

        let f_ri = fix_imbalance(
            tio,
            oram,
            flat,
            ptr,
            nodeptrs,
            node.pointers,
            new_p_bal_l,
            new_p_bal_r,
            &mut bal_upd,
            c_prime,
            cs_ptr,
            imb,
            ret,
        )
        .await?;

        update_ret_struct(tio, ptr, f_2, f_c2, f_c4, lf, f_ri, found, &mut bal_upd, ret)
            .await?;

        Ok((true, bal_upd))
    })
}
