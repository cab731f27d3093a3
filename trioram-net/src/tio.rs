//! Per-worker IO context.
//!
//! All three parties run the same protocol code over an [`MpcTio`]; the
//! context knows the party's role and turns the operations that do not
//! apply to it into no-ops. A computational party owns a peer stream and
//! a server stream; the server owns one stream to each computational
//! party. Queued bytes become one segment per round boundary
//! ([`MpcTio::round`]), mirroring the coroutine yield discipline of the
//! protocol design: everything an operation will send is queued before
//! the round, and after it the expected reply bytes are available.

use std::collections::HashMap;

use tracing::warn;
use trioram_core::wire::Wire;
use trioram_core::{HalfTriple, MultTriple, SelectTriple};

use crate::bearer::Bearer;
use crate::error::Result;
use crate::precomp::{PreCompDir, PreCompReader, PreCompWriter};
use crate::stream::{IoStats, SingleIo};

/// Options shared by the party constructors.
#[derive(Clone, Debug)]
pub struct TioOptions {
    pub thread_num: usize,
    /// Preprocessing runs consume correlated randomness inline from the
    /// server; online runs consume it from the worker's files.
    pub preprocessing: bool,
    /// Directory holding the preprocessing files.
    pub dir: std::path::PathBuf,
}

impl TioOptions {
    pub fn new(dir: impl AsRef<std::path::Path>) -> Self {
        TioOptions {
            thread_num: 0,
            preprocessing: false,
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn preprocessing(mut self, on: bool) -> Self {
        self.preprocessing = on;
        self
    }

    pub fn thread_num(mut self, n: usize) -> Self {
        self.thread_num = n;
        self
    }
}

enum Role {
    Computational { peer: SingleIo, server: SingleIo },
    Server { p0: SingleIo, p1: SingleIo },
}

pub struct MpcTio {
    player: u8,
    preprocessing: bool,
    role: Role,
    precomp: PreCompDir,
    readers: HashMap<String, PreCompReader>,
    writers: HashMap<String, PreCompWriter>,
    lamport: u64,
    aes_ops: u64,
}

impl MpcTio {
    /// Context for computational party `player` (0 or 1).
    pub fn computational(player: u8, peer: Bearer, server: Bearer, opts: TioOptions) -> Self {
        assert!(player < 2);
        MpcTio {
            player,
            preprocessing: opts.preprocessing,
            role: Role::Computational {
                peer: SingleIo::new(peer),
                server: SingleIo::new(server),
            },
            precomp: PreCompDir::new(&opts.dir, player, opts.thread_num),
            readers: HashMap::new(),
            writers: HashMap::new(),
            lamport: 0,
            aes_ops: 0,
        }
    }

    /// Context for the server (player 2).
    pub fn server(p0: Bearer, p1: Bearer, opts: TioOptions) -> Self {
        MpcTio {
            player: 2,
            preprocessing: opts.preprocessing,
            role: Role::Server {
                p0: SingleIo::new(p0),
                p1: SingleIo::new(p1),
            },
            precomp: PreCompDir::new(&opts.dir, 2, opts.thread_num),
            readers: HashMap::new(),
            writers: HashMap::new(),
            lamport: 0,
            aes_ops: 0,
        }
    }

    #[inline]
    pub fn player(&self) -> u8 {
        self.player
    }

    #[inline]
    pub fn is_server(&self) -> bool {
        self.player == 2
    }

    #[inline]
    pub fn is_preprocessing(&self) -> bool {
        self.preprocessing
    }

    #[inline]
    pub fn aes_ops(&mut self) -> &mut u64 {
        &mut self.aes_ops
    }

    #[inline]
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    // Queueing. Operations that do not apply to this role are no-ops so
    // that all three parties can run identical protocol code.

    pub fn queue_peer(&mut self, data: &[u8]) {
        if let Role::Computational { peer, .. } = &mut self.role {
            peer.queue(data);
        }
    }

    pub fn queue_server(&mut self, data: &[u8]) {
        if let Role::Computational { server, .. } = &mut self.role {
            server.queue(data);
        }
    }

    pub fn queue_p0(&mut self, data: &[u8]) {
        if let Role::Server { p0, .. } = &mut self.role {
            p0.queue(data);
        }
    }

    pub fn queue_p1(&mut self, data: &[u8]) {
        if let Role::Server { p1, .. } = &mut self.role {
            p1.queue(data);
        }
    }

    /// Queue to both computational parties (server only).
    pub fn queue_both(&mut self, data: &[u8]) {
        self.queue_p0(data);
        self.queue_p1(data);
    }

    // Receiving. Roles without the stream read nothing and get zeros,
    // keeping shared control flow aligned.

    pub async fn recv_peer(&mut self, len: usize) -> Result<Vec<u8>> {
        match &mut self.role {
            Role::Computational { peer, .. } => peer.recv(len).await,
            Role::Server { .. } => Ok(vec![0; len]),
        }
    }

    pub async fn recv_server(&mut self, len: usize) -> Result<Vec<u8>> {
        match &mut self.role {
            Role::Computational { server, .. } => server.recv(len).await,
            Role::Server { .. } => Ok(vec![0; len]),
        }
    }

    pub async fn recv_p0(&mut self, len: usize) -> Result<Vec<u8>> {
        match &mut self.role {
            Role::Server { p0, .. } => p0.recv(len).await,
            Role::Computational { .. } => Ok(vec![0; len]),
        }
    }

    pub async fn recv_p1(&mut self, len: usize) -> Result<Vec<u8>> {
        match &mut self.role {
            Role::Server { p1, .. } => p1.recv(len).await,
            Role::Computational { .. } => Ok(vec![0; len]),
        }
    }

    /// Flush every queued segment: the round boundary. Everything this
    /// worker will send this round must be queued before the call.
    pub fn round(&mut self) {
        match &mut self.role {
            Role::Computational { peer, server } => {
                peer.send();
                server.send();
            }
            Role::Server { p0, p1 } => {
                p0.send();
                p1.send();
            }
        }
        self.lamport += 1;
    }

    /// Cross-check the Lamport clocks with the peer (debug consistency
    /// only; the server has no peer and skips).
    pub async fn sync_lamport(&mut self) -> Result<()> {
        if self.is_server() {
            return Ok(());
        }
        let mine = self.lamport;
        self.queue_peer(&mine.to_le_bytes());
        self.round();
        let theirs = u64::from_le_bytes(self.recv_peer(8).await?.try_into().unwrap());
        if theirs != mine {
            warn!(ours = mine, theirs, "lamport clocks disagree");
        }
        self.lamport = self.lamport.max(theirs);
        Ok(())
    }

    // Correlated randomness.

    /// One multiplication triple. Online, from this worker's store; in
    /// preprocessing, inline from the server (who, running the same code,
    /// mints and queues a fresh pair here).
    pub async fn triple(&mut self) -> Result<MultTriple> {
        if self.is_server() {
            if self.preprocessing {
                let (t0, t1) = MultTriple::generate();
                self.queue_p0(&trioram_core::wire::to_bytes(&t0));
                self.queue_p1(&trioram_core::wire::to_bytes(&t1));
            }
            return Ok(MultTriple::default());
        }
        if self.preprocessing {
            let buf = self.recv_server(MultTriple::SIZE).await?;
            return Ok(MultTriple::read(&buf));
        }
        self.pop_typed("triples").await
    }

    /// One half-triple; see [`MpcTio::triple`] for sourcing.
    pub async fn halftriple(&mut self) -> Result<HalfTriple> {
        if self.is_server() {
            if self.preprocessing {
                let (h0, h1) = HalfTriple::generate();
                self.queue_p0(&trioram_core::wire::to_bytes(&h0));
                self.queue_p1(&trioram_core::wire::to_bytes(&h1));
            }
            return Ok(HalfTriple::default());
        }
        if self.preprocessing {
            let buf = self.recv_server(HalfTriple::SIZE).await?;
            return Ok(HalfTriple::read(&buf));
        }
        self.pop_typed("halves").await
    }

    /// One node select triple, for DPF-node and XOR-word selects.
    /// During preprocessing (RDPF construction) these come inline from
    /// the server; online they come from this worker's store.
    pub async fn select_triple(&mut self) -> Result<SelectTriple> {
        if self.is_server() {
            if self.preprocessing {
                let (s0, s1) = SelectTriple::generate();
                self.queue_p0(&trioram_core::wire::to_bytes(&s0));
                self.queue_p1(&trioram_core::wire::to_bytes(&s1));
            }
            return Ok(SelectTriple::default());
        }
        if self.preprocessing {
            let buf = self.recv_server(SelectTriple::SIZE).await?;
            return Ok(SelectTriple::read(&buf));
        }
        self.pop_typed("selects").await
    }

    /// Pop a raw fixed-size record from this worker's store for `prefix`.
    /// Used by the DPF layer, whose record sizes depend on depth and
    /// width.
    pub async fn pop_record(&mut self, prefix: &str, size: usize) -> Result<Vec<u8>> {
        if !self.readers.contains_key(prefix) {
            let r = self.precomp.reader(prefix, size)?;
            self.readers.insert(prefix.to_string(), r);
        }
        self.readers.get_mut(prefix).unwrap().next_record()
    }

    async fn pop_typed<T: Wire>(&mut self, prefix: &str) -> Result<T> {
        let buf = self.pop_record(prefix, T::SIZE).await?;
        Ok(T::read(&buf))
    }

    /// Append a raw record to this worker's store for `prefix`
    /// (preprocessing producers).
    pub fn store_record(&mut self, prefix: &str, record: &[u8]) -> Result<()> {
        if !self.writers.contains_key(prefix) {
            let w = self.precomp.writer(prefix)?;
            self.writers.insert(prefix.to_string(), w);
        }
        self.writers.get_mut(prefix).unwrap().append(record)
    }

    /// Flush all store writers (end of preprocessing).
    pub fn finish_stores(&mut self) -> Result<()> {
        for (_, w) in self.writers.drain() {
            w.finish()?;
        }
        Ok(())
    }

    /// Byte counters for this worker's streams, peer-ish stream first.
    pub fn stats(&self) -> (IoStats, IoStats) {
        match &self.role {
            Role::Computational { peer, server } => (peer.stats(), server.stats()),
            Role::Server { p0, p1 } => (p0.stats(), p1.stats()),
        }
    }

    pub fn reset_stats(&mut self) {
        match &mut self.role {
            Role::Computational { peer, server } => {
                peer.reset_stats();
                server.reset_stats();
            }
            Role::Server { p0, p1 } => {
                p0.reset_stats();
                p1.reset_stats();
            }
        }
    }
}
