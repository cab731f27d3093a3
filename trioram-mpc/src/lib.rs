//! Online MPC primitives.
//!
//! P0 and P1 hold shares; the server contributed correlated randomness in
//! advance and is idle here. Every primitive queues what it will send,
//! flushes at the round boundary, then reads exactly the bytes it
//! expects. The server runs the same functions as no-ops so that all
//! three parties keep identical control flow.
//!
//! Each function's cost note (words sent, messages, records consumed) is
//! part of its contract: preprocessing provisions records against these
//! counts.

use trioram_core::share::{RegAS, RegBS, RegXS};
use trioram_core::value::{bit_bytes, mask_bits, NBits, Value};
use trioram_core::wire::{read_trunc, write_trunc};
use trioram_crypto::node::{if_mask, DpfNode};
use trioram_net::error::Result;
use trioram_net::MpcTio;

/// `z = x * y mod 2^nbits` from additive shares of `x` and `y`.
///
/// Cost: 2 words in 1 message; 1 MultTriple.
pub async fn mul(tio: &mut MpcTio, x: RegAS, y: RegAS, nbits: NBits) -> Result<RegAS> {
    let mask = mask_bits(nbits);
    // z starts as an additive share of x0*y1 + y0*x1; adding our x*y
    // (the peer adds theirs) completes the product.
    let mut z = cross(tio, x, y, nbits).await?;
    z.ashare = z
        .ashare
        .wrapping_add(x.ashare.wrapping_mul(y.ashare))
        & mask;
    Ok(z)
}

/// `z = x0*y1 + y0*x1` (the cross terms of a product).
///
/// Cost: 2 words in 1 message; 1 MultTriple.
pub async fn cross(tio: &mut MpcTio, x: RegAS, y: RegAS, nbits: NBits) -> Result<RegAS> {
    let mask = mask_bits(nbits);
    let nbytes = bit_bytes(nbits);
    let t = tio.triple().await?;

    let blind_x = x.ashare.wrapping_add(t.x) & mask;
    let blind_y = y.ashare.wrapping_add(t.y) & mask;
    let mut msg = Vec::with_capacity(2 * nbytes);
    write_trunc(blind_x, nbytes, &mut msg);
    write_trunc(blind_y, nbytes, &mut msg);
    tio.queue_peer(&msg);

    tio.round();

    let reply = tio.recv_peer(2 * nbytes).await?;
    let peer_blind_x = read_trunc(&reply[..nbytes]);
    let peer_blind_y = read_trunc(&reply[nbytes..]);

    let z = x
        .ashare
        .wrapping_mul(peer_blind_y)
        .wrapping_sub(t.y.wrapping_mul(peer_blind_x))
        .wrapping_add(t.z)
        & mask;
    Ok(RegAS::from_share(z))
}

/// P0 holds the cleartext `x`, P1 the cleartext `y` (both passed in the
/// `x` parameter); the result is an additive sharing of `x * y`.
///
/// Cost: 1 word in 1 message; 1 HalfTriple.
pub async fn valuemul(tio: &mut MpcTio, x: Value, nbits: NBits) -> Result<RegAS> {
    let mask = mask_bits(nbits);
    let nbytes = bit_bytes(nbits);
    let h = tio.halftriple().await?;

    let blind_x = x.wrapping_add(h.x) & mask;
    let mut msg = Vec::with_capacity(nbytes);
    write_trunc(blind_x, nbytes, &mut msg);
    tio.queue_peer(&msg);

    tio.round();

    let reply = tio.recv_peer(nbytes).await?;
    let peer_blind = read_trunc(&reply);

    let z = match tio.player() {
        0 => x.wrapping_mul(peer_blind).wrapping_add(h.z),
        1 => h.x.wrapping_neg().wrapping_mul(peer_blind).wrapping_add(h.z),
        _ => 0,
    } & mask;
    Ok(RegAS::from_share(z))
}

/// `z = f * y` where `f` is a bit share and `y` an additive share.
///
/// Cost: 2 words in 1 message; 1 MultTriple.
pub async fn flagmult(tio: &mut MpcTio, f: RegBS, y: RegAS, nbits: NBits) -> Result<RegAS> {
    let mask = mask_bits(nbits);
    let fval = f.bshare as Value;
    // Shares of [(1-2*f0)*y0]*f1 + [(1-2*f1)*y1]*f0, plus each side's
    // f*y, add up to (f0 XOR f1)*(y0+y1).
    let mut z = cross(
        tio,
        y * (1u64.wrapping_sub(2 * fval)),
        RegAS::from_share(fval),
        nbits,
    )
    .await?;
    z.ashare = z.ashare.wrapping_add(fval.wrapping_mul(y.ashare)) & mask;
    Ok(z)
}

/// `z = f ? y : x` on additive shares, computed as `x + f*(y-x)`.
///
/// Cost: 2 words in 1 message; 1 MultTriple.
pub async fn select(
    tio: &mut MpcTio,
    f: RegBS,
    x: RegAS,
    y: RegAS,
    nbits: NBits,
) -> Result<RegAS> {
    let mask = mask_bits(nbits);
    let mut z = flagmult(tio, f, y - x, nbits).await?;
    z.ashare = z.ashare.wrapping_add(x.ashare) & mask;
    Ok(z)
}

/// Obliviously swap `x` and `y` if `f` is set: with `s = f*(y-x)`,
/// `x += s` and `y -= s`.
///
/// Cost: 2 words in 1 message; 1 MultTriple.
pub async fn oswap(
    tio: &mut MpcTio,
    x: &mut RegAS,
    y: &mut RegAS,
    f: RegBS,
    nbits: NBits,
) -> Result<()> {
    let mask = mask_bits(nbits);
    let s = flagmult(tio, f, *y - *x, nbits).await?;
    x.ashare = x.ashare.wrapping_add(s.ashare) & mask;
    y.ashare = y.ashare.wrapping_sub(s.ashare) & mask;
    Ok(())
}

/// AND of two bit shares. The low bits of a MultTriple satisfy the GF(2)
/// Beaver relation `x0&y1 ^ x1&y0 = z0^z1`, so one word triple covers the
/// cross terms.
///
/// Cost: 2 bytes in 1 message; 1 MultTriple.
pub async fn and(tio: &mut MpcTio, f: RegBS, g: RegBS) -> Result<RegBS> {
    let t = tio.triple().await?;
    let xb = t.x & 1 == 1;
    let yb = t.y & 1 == 1;
    let zb = t.z & 1 == 1;

    let blind_f = f.bshare ^ xb;
    let blind_g = g.bshare ^ yb;
    tio.queue_peer(&[blind_f as u8, blind_g as u8]);

    tio.round();

    let reply = tio.recv_peer(2).await?;
    let peer_blind_f = reply[0] & 1 == 1;
    let peer_blind_g = reply[1] & 1 == 1;

    let crossbits = (f.bshare & peer_blind_g) ^ (yb & peer_blind_f) ^ zb;
    Ok(RegBS::from_share(crossbits ^ (f.bshare & g.bshare)))
}

/// OR of two bit shares, by De Morgan over [`and`].
///
/// Cost: 2 bytes in 1 message; 1 MultTriple.
pub async fn or(tio: &mut MpcTio, f: RegBS, g: RegBS) -> Result<RegBS> {
    let flip = tio.player() == 0;
    let nf = RegBS::from_share(f.bshare ^ flip);
    let ng = RegBS::from_share(g.bshare ^ flip);
    let z = and(tio, nf, ng).await?;
    Ok(RegBS::from_share(z.bshare ^ flip))
}

/// Convert an XOR sharing of `x` into an additive sharing.
///
/// Uses `A + B = (A XOR B) + 2*(A AND B)`: additive shares of each bit
/// product `A_i * B_i` (i = 0..nbits-2; the top bit shifts out) come from
/// one valuemul each, all batched into a single message.
///
/// Cost: nbits-1 words in 1 message; nbits-1 HalfTriples.
pub async fn xs_to_as(tio: &mut MpcTio, x: RegXS, nbits: NBits) -> Result<RegAS> {
    let mask = mask_bits(nbits);
    let n = nbits - 1;

    // Phase one of each valuemul: blind own bit, queue.
    let mut halves = Vec::with_capacity(n as usize);
    let mut msg = Vec::with_capacity(n as usize * 8);
    for i in 0..n {
        let h = tio.halftriple().await?;
        let bit = (x.xshare >> i) & 1;
        write_trunc(bit.wrapping_add(h.x), 8, &mut msg);
        halves.push(h);
    }
    tio.queue_peer(&msg);

    tio.round();

    // Phase two: read all the peer's blinds, finish each product.
    let reply = tio.recv_peer(n as usize * 8).await?;
    let mut c: Value = 0;
    for i in 0..n {
        let h = &halves[i as usize];
        let peer_blind = read_trunc(&reply[i as usize * 8..(i as usize + 1) * 8]);
        let bit = (x.xshare >> i) & 1;
        let prod = match tio.player() {
            0 => bit.wrapping_mul(peer_blind).wrapping_add(h.z),
            1 => h.x.wrapping_neg().wrapping_mul(peer_blind).wrapping_add(h.z),
            _ => 0,
        };
        c = c.wrapping_add(prod << (i + 1));
    }
    Ok(RegAS::from_share(x.xshare.wrapping_sub(c) & mask))
}

/// `z = f ? y : x` where `x`, `y` are XOR shares of 128-bit DPF nodes and
/// `f` is a bit share; the *reconstructed* node is returned to both
/// parties. Used while growing a DPF level: the parties learn the
/// correction word without learning which side it equalizes.
///
/// Cost: 6 64-bit words in 2 messages; 1 SelectTriple.
pub async fn reconstruct_choice(
    tio: &mut MpcTio,
    f: RegBS,
    x: DpfNode,
    y: DpfNode,
) -> Result<DpfNode> {
    Ok(reconstruct_choice_batch(tio, f, &[(x, y)]).await?[0])
}

/// Several [`reconstruct_choice`] instances with the same flag, two
/// messages total. The DPF leaf layer selects all its correction nodes at
/// once.
pub async fn reconstruct_choice_batch(
    tio: &mut MpcTio,
    f: RegBS,
    xy: &[(DpfNode, DpfNode)],
) -> Result<Vec<DpfNode>> {
    let n = xy.len();
    let fext = if_mask(f.bshare);

    let mut triples = Vec::with_capacity(n);
    let mut msg = Vec::with_capacity(n * 32);
    for &(x, y) in xy {
        let t = tio.select_triple().await?;
        let xext = if_mask(t.x);
        let blind_f = fext ^ xext;
        let d = x ^ y;
        let blind_d = d ^ t.y;
        msg.extend_from_slice(&blind_f.to_le_bytes());
        msg.extend_from_slice(&blind_d.to_le_bytes());
        triples.push(t);
    }
    tio.queue_peer(&msg);

    tio.round();

    let reply = tio.recv_peer(n * 32).await?;
    let mut zshares = Vec::with_capacity(n);
    let mut msg2 = Vec::with_capacity(n * 16);
    for (i, &(x, y)) in xy.iter().enumerate() {
        let t = &triples[i];
        let peer_blind_f = u128::from_le_bytes(reply[i * 32..i * 32 + 16].try_into().unwrap());
        let peer_blind_d =
            u128::from_le_bytes(reply[i * 32 + 16..i * 32 + 32].try_into().unwrap());
        let d = x ^ y;
        // Our share of f ? y : x = (f & (x^y)) ^ x.
        let zshare =
            (fext & peer_blind_d) ^ (t.y & peer_blind_f) ^ (fext & d) ^ t.z ^ x;
        msg2.extend_from_slice(&zshare.to_le_bytes());
        zshares.push(zshare);
    }
    tio.queue_peer(&msg2);

    tio.round();

    let reply2 = tio.recv_peer(n * 16).await?;
    let mut out = Vec::with_capacity(n);
    for (i, zshare) in zshares.into_iter().enumerate() {
        let peer_zshare = u128::from_le_bytes(reply2[i * 16..i * 16 + 16].try_into().unwrap());
        out.push(zshare ^ peer_zshare);
    }
    Ok(out)
}

/// `z = f ? y : x` on bit shares: `x ^ (f & (x^y))`.
///
/// Cost: 2 bytes in 1 message; 1 MultTriple.
pub async fn select_bs(tio: &mut MpcTio, f: RegBS, x: RegBS, y: RegBS) -> Result<RegBS> {
    let d = and(tio, f, x ^ y).await?;
    Ok(x ^ d)
}

/// `z = f ? y : x` on XOR shares: `x ^ (f & (x^y))`, with the bit-times-
/// word product from one SelectTriple. One round, unlike
/// [`reconstruct_choice`]: the result stays shared.
///
/// Cost: 2 128-bit nodes in 1 message; 1 SelectTriple.
pub async fn select_xs(tio: &mut MpcTio, f: RegBS, x: RegXS, y: RegXS) -> Result<RegXS> {
    let t = tio.select_triple().await?;
    let fext = if_mask(f.bshare);
    let xext = if_mask(t.x);
    let d = (x.xshare ^ y.xshare) as u128;

    let blind_f = fext ^ xext;
    let blind_d = d ^ t.y;
    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(&blind_f.to_le_bytes());
    msg.extend_from_slice(&blind_d.to_le_bytes());
    tio.queue_peer(&msg);

    tio.round();

    let reply = tio.recv_peer(32).await?;
    let peer_blind_f = u128::from_le_bytes(reply[0..16].try_into().unwrap());
    let peer_blind_d = u128::from_le_bytes(reply[16..32].try_into().unwrap());

    let zshare = (fext & peer_blind_d)
        ^ (t.y & peer_blind_f)
        ^ (fext & d)
        ^ t.z
        ^ x.xshare as u128;
    Ok(RegXS::from_share(zshare as u64))
}

/// Many `flagmult`s in one round (the heap's shift-and-insert step is 2h
/// of these in a single message).
pub async fn flagmult_batch(
    tio: &mut MpcTio,
    items: &[(RegBS, RegAS)],
    nbits: NBits,
) -> Result<Vec<RegAS>> {
    let mask = mask_bits(nbits);
    let nbytes = bit_bytes(nbits);

    // Phase one of the underlying cross for every item.
    let mut st = Vec::with_capacity(items.len());
    let mut msg = Vec::with_capacity(items.len() * 2 * nbytes);
    for &(f, y) in items {
        let t = tio.triple().await?;
        let fval = f.bshare as Value;
        let cx = y * (1u64.wrapping_sub(2 * fval));
        let blind_x = cx.ashare.wrapping_add(t.x) & mask;
        let blind_y = fval.wrapping_add(t.y) & mask;
        write_trunc(blind_x, nbytes, &mut msg);
        write_trunc(blind_y, nbytes, &mut msg);
        st.push((t, cx, fval));
    }
    tio.queue_peer(&msg);

    tio.round();

    let reply = tio.recv_peer(items.len() * 2 * nbytes).await?;
    let mut out = Vec::with_capacity(items.len());
    for (i, &(_, y)) in items.iter().enumerate() {
        let (t, cx, fval) = st[i];
        let peer_blind_x = read_trunc(&reply[i * 2 * nbytes..i * 2 * nbytes + nbytes]);
        let peer_blind_y =
            read_trunc(&reply[i * 2 * nbytes + nbytes..(i + 1) * 2 * nbytes]);
        let z = cx
            .ashare
            .wrapping_mul(peer_blind_y)
            .wrapping_sub(t.y.wrapping_mul(peer_blind_x))
            .wrapping_add(t.z)
            .wrapping_add(fval.wrapping_mul(y.ashare))
            & mask;
        out.push(RegAS::from_share(z));
    }
    Ok(out)
}

/// Publish an additive-shared value to all three parties.
///
/// The peers exchange shares and copy them to the server so control flow
/// downstream of the value can never diverge between parties.
pub async fn reconstruct_as(tio: &mut MpcTio, x: RegAS, nbits: NBits) -> Result<Value> {
    let mask = mask_bits(nbits);
    let mine = x.ashare.to_le_bytes();
    tio.queue_peer(&mine);
    tio.queue_server(&mine);
    tio.round();
    if tio.is_server() {
        let a = Value::from_le_bytes(tio.recv_p0(8).await?.try_into().unwrap());
        let b = Value::from_le_bytes(tio.recv_p1(8).await?.try_into().unwrap());
        Ok(a.wrapping_add(b) & mask)
    } else {
        let theirs = Value::from_le_bytes(tio.recv_peer(8).await?.try_into().unwrap());
        Ok(x.ashare.wrapping_add(theirs) & mask)
    }
}

/// Publish an XOR-shared value to all three parties.
pub async fn reconstruct_xs(tio: &mut MpcTio, x: RegXS, nbits: NBits) -> Result<Value> {
    let mask = mask_bits(nbits);
    let mine = x.xshare.to_le_bytes();
    tio.queue_peer(&mine);
    tio.queue_server(&mine);
    tio.round();
    if tio.is_server() {
        let a = Value::from_le_bytes(tio.recv_p0(8).await?.try_into().unwrap());
        let b = Value::from_le_bytes(tio.recv_p1(8).await?.try_into().unwrap());
        Ok((a ^ b) & mask)
    } else {
        let theirs = Value::from_le_bytes(tio.recv_peer(8).await?.try_into().unwrap());
        Ok((x.xshare ^ theirs) & mask)
    }
}

/// Publish a bit share to all three parties.
pub async fn reconstruct_bs(tio: &mut MpcTio, b: RegBS) -> Result<bool> {
    let mine = [b.bshare as u8];
    tio.queue_peer(&mine);
    tio.queue_server(&mine);
    tio.round();
    if tio.is_server() {
        let a = tio.recv_p0(1).await?[0] & 1;
        let c = tio.recv_p1(1).await?[0] & 1;
        Ok(a ^ c == 1)
    } else {
        let theirs = tio.recv_peer(1).await?[0] & 1;
        Ok(b.bshare ^ (theirs == 1))
    }
}
