//! Spill-file service for tools that buffer more records than fit in
//! memory.
//!
//! Spill streams use `FT_TEMPFILE`, whose layout carries every canonical
//! field, so a record survives any number of spill/merge passes unchanged.
//! The backing directory is removed when the store drops.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::compress::CompressionMethod;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::header::FileFormat;
use crate::stream::{FlowReader, FlowWriter, WriterOptions};

pub const TEMPFILE_VERSION: u8 = 1;

pub struct TempStore {
    dir: tempfile::TempDir,
    created: usize,
}

impl TempStore {
    /// Creates a store under the system temp directory.
    pub fn new() -> Result<Self> {
        Ok(TempStore {
            dir: tempfile::tempdir()?,
            created: 0,
        })
    }

    /// Creates a store under `base`, for callers pointed at a scratch
    /// filesystem larger than the default one.
    pub fn in_dir(base: &Path) -> Result<Self> {
        Ok(TempStore {
            dir: tempfile::tempdir_in(base)?,
            created: 0,
        })
    }

    pub fn path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("spill-{index:04}.rwf"))
    }

    /// Number of spill files handed out so far; indices below this have
    /// been created (and possibly removed).
    pub fn created(&self) -> usize {
        self.created
    }

    /// Opens the next spill file for writing and returns its index.
    pub fn create(
        &mut self,
        config: &EngineConfig,
    ) -> Result<(usize, FlowWriter<BufWriter<File>>)> {
        let index = self.created;
        let file = File::create(self.path(index))?;
        let mut options = WriterOptions::new(FileFormat::Tempfile, TEMPFILE_VERSION);
        options.compression = CompressionMethod::Default;
        let writer = FlowWriter::from_writer(BufWriter::new(file), options, config)?;
        self.created += 1;
        Ok((index, writer))
    }

    /// Reopens a previously written spill file.
    pub fn open(&self, index: usize) -> Result<FlowReader<BufReader<File>>> {
        let file = File::open(self.path(index))?;
        FlowReader::from_reader(BufReader::new(file))
    }

    /// Deletes one spill file early; merge passes call this as soon as a
    /// file has been drained.
    pub fn remove(&self, index: usize) -> Result<()> {
        fs::remove_file(self.path(index))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RwRec;

    fn record(sport: u16) -> RwRec {
        let mut rec = RwRec::new();
        rec.set_ipv4_addrs(0xC0A8_0001, 0xC0A8_0002, 0xC0A8_00FE);
        rec.sport = sport;
        rec.dport = 53;
        rec.proto = 17;
        rec.pkts = 2;
        rec.bytes = 128;
        rec.application = 53;
        rec.memo = 7;
        rec
    }

    #[test]
    fn spill_and_drain() {
        let config = EngineConfig::default();
        let mut store = TempStore::new().unwrap();

        let (index, mut writer) = store.create(&config).unwrap();
        assert_eq!(index, 0);
        for sport in [100, 200, 300] {
            writer.write_record(&record(sport)).unwrap();
        }
        writer.close().unwrap();

        let mut reader = store.open(index).unwrap();
        assert_eq!(reader.format(), FileFormat::Tempfile);
        for sport in [100, 200, 300] {
            assert_eq!(reader.read_record().unwrap().unwrap(), record(sport));
        }
        assert!(reader.read_record().unwrap().is_none());

        store.remove(index).unwrap();
        assert!(!store.path(index).exists());
    }

    #[test]
    fn spill_preserves_ipv6_records() {
        let config = EngineConfig::default();
        let mut store = TempStore::new().unwrap();

        let mut v6 = record(4000);
        v6.set_sip("2001:db8::10".parse().unwrap());
        v6.set_dip("2001:db8::20".parse().unwrap());

        let (index, mut writer) = store.create(&config).unwrap();
        writer.write_record(&v6).unwrap();
        writer.close().unwrap();

        let mut reader = store.open(index).unwrap();
        assert_eq!(reader.read_record().unwrap().unwrap(), v6);
    }

    #[test]
    fn indices_are_not_reused() {
        let config = EngineConfig::default();
        let mut store = TempStore::new().unwrap();
        let (a, mut wa) = store.create(&config).unwrap();
        wa.close().unwrap();
        store.remove(a).unwrap();
        let (b, mut wb) = store.create(&config).unwrap();
        wb.close().unwrap();
        assert_ne!(a, b);
        assert_eq!(store.created(), 2);
    }
}
