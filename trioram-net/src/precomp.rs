//! File-backed stores of precomputed correlated randomness.
//!
//! Each (party, worker) pair owns one file per record kind, named
//! `<prefix>.p<player%10>.t<thread>`. Files are flat concatenations of
//! fixed-size little-endian records appended in producer order and
//! consumed in the same order; running out of records mid-protocol is
//! fatal.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use trioram_core::wire::Wire;

use crate::error::{Error, Result};

/// A (directory, player, worker) context naming this worker's stores.
#[derive(Clone, Debug)]
pub struct PreCompDir {
    dir: PathBuf,
    player: u8,
    thread_num: usize,
}

impl PreCompDir {
    pub fn new(dir: impl AsRef<Path>, player: u8, thread_num: usize) -> Self {
        PreCompDir {
            dir: dir.as_ref().to_path_buf(),
            player,
            thread_num,
        }
    }

    /// The file path for a record kind.
    pub fn path(&self, prefix: &str) -> PathBuf {
        self.dir
            .join(format!("{prefix}.p{}.t{}", self.player % 10, self.thread_num))
    }

    /// Open a store for appending (truncates any previous run's file).
    pub fn writer(&self, prefix: &str) -> Result<PreCompWriter> {
        let file = File::create(self.path(prefix))?;
        Ok(PreCompWriter {
            out: BufWriter::new(file),
        })
    }

    /// Open a store of `record_size`-byte records for consumption.
    pub fn reader(&self, prefix: &str, record_size: usize) -> Result<PreCompReader> {
        let file = File::open(self.path(prefix)).map_err(|_| Error::PrecompExhausted {
            prefix: prefix.to_string(),
        })?;
        let len = file.metadata()?.len();
        if len % record_size as u64 != 0 {
            return Err(Error::PrecompSize {
                prefix: prefix.to_string(),
                got: len,
                record: record_size,
            });
        }
        Ok(PreCompReader {
            prefix: prefix.to_string(),
            record_size,
            input: BufReader::new(file),
        })
    }
}

pub struct PreCompWriter {
    out: BufWriter<File>,
}

impl PreCompWriter {
    pub fn append(&mut self, record: &[u8]) -> Result<()> {
        self.out.write_all(record)?;
        Ok(())
    }

    pub fn append_typed<T: Wire>(&mut self, record: &T) -> Result<()> {
        let mut buf = Vec::with_capacity(T::SIZE);
        record.write(&mut buf);
        self.append(&buf)
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

pub struct PreCompReader {
    prefix: String,
    record_size: usize,
    input: BufReader<File>,
}

impl PreCompReader {
    /// Pop the next record, in producer order.
    pub fn next_record(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.record_size];
        self.input
            .read_exact(&mut buf)
            .map_err(|_| Error::PrecompExhausted {
                prefix: self.prefix.clone(),
            })?;
        Ok(buf)
    }

    pub fn next_typed<T: Wire>(&mut self) -> Result<T> {
        debug_assert_eq!(self.record_size, T::SIZE);
        Ok(T::read(&self.next_record()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trioram_core::MultTriple;

    #[test]
    fn append_then_consume_in_order() {
        let dir = std::env::temp_dir().join(format!("trioram-precomp-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = PreCompDir::new(&dir, 0, 3);
        let mut w = ctx.writer("triples").unwrap();
        let (a, _) = MultTriple::generate();
        let (b, _) = MultTriple::generate();
        w.append_typed(&a).unwrap();
        w.append_typed(&b).unwrap();
        w.finish().unwrap();

        let mut r = ctx.reader("triples", MultTriple::SIZE).unwrap();
        assert_eq!(r.next_typed::<MultTriple>().unwrap(), a);
        assert_eq!(r.next_typed::<MultTriple>().unwrap(), b);
        assert!(matches!(
            r.next_typed::<MultTriple>(),
            Err(Error::PrecompExhausted { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn naming_matches_convention() {
        let ctx = PreCompDir::new("/tmp/x", 12, 4);
        assert!(ctx.path("halves").ends_with("halves.p2.t4"));
    }
}
