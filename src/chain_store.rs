//! The append-only chain log: one `BlockRecord` JSON object per line,
//! plus genesis-file initialization. Random access is by byte offset;
//! callers (the `state` module) maintain the hash→offset and
//! height→offset indices separately and use `read_at`/`append` to stay
//! in sync with them.
//!
//! The source this was distilled from recorded `filePos = size + 1` on
//! append, which causes `seek(offset)` to skip the leading byte of a
//! line. That off-by-one is deliberately not reproduced: `append` here
//! returns the offset of the record's first byte, and `read_at` of that
//! offset returns the record verbatim.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::block::BlockRecord;
use crate::error::{NodeError, Result};
use crate::primitives::Address;

const CHAIN_FILE_NAME: &str = "blockchain.db";
const GENESIS_FILE_NAME: &str = "genesis.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    pub genesis_time: String,
    pub chain_id: String,
    pub symbol: String,
    pub balances: Map<String, serde_json::Value>,
}

impl Genesis {
    pub fn balances(&self) -> Result<Vec<(Address, u64)>> {
        self.balances
            .iter()
            .map(|(addr, value)| {
                let amount = value
                    .as_u64()
                    .ok_or_else(|| NodeError::InvalidArgument(format!("non-numeric genesis balance for {addr}")))?;
                Ok((Address::from_hex(addr)?, amount))
            })
            .collect()
    }
}

pub struct ChainStore {
    file: File,
    dir: PathBuf,
}

impl ChainStore {
    /// Create the data directory and genesis file if missing, and ensure
    /// an (empty, if new) chain log file exists. Returns the opened store
    /// and the parsed genesis.
    pub fn init_if_absent(dir: &Path, default_genesis: &Genesis) -> Result<(Self, Genesis)> {
        fs::create_dir_all(dir)?;

        let genesis_path = dir.join(GENESIS_FILE_NAME);
        if !genesis_path.exists() {
            let bytes = serde_json::to_vec_pretty(default_genesis)?;
            fs::write(&genesis_path, bytes)?;
        }
        let genesis_bytes = fs::read(&genesis_path)?;
        let genesis: Genesis = serde_json::from_slice(&genesis_bytes)?;

        let chain_path = dir.join(CHAIN_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&chain_path)?;

        Ok((Self { file, dir: dir.to_path_buf() }, genesis))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Yield every `(offset, BlockRecord)` pair in file order. A corrupt
    /// line aborts the scan.
    pub fn scan(&mut self) -> Result<Vec<(u64, BlockRecord)>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }
            let trimmed = line.trim_end_matches('\n');
            if trimmed.is_empty() {
                offset += bytes_read as u64;
                continue;
            }
            let record: BlockRecord = serde_json::from_str(trimmed)
                .map_err(|e| NodeError::ChainStore(format!("corrupt chain log line at offset {offset}: {e}")))?;
            records.push((offset, record));
            offset += bytes_read as u64;
        }

        Ok(records)
    }

    /// Append one record as a JSON line. Returns the offset of its first
    /// byte (the file size before this write).
    pub fn append(&mut self, record: &BlockRecord) -> Result<u64> {
        let offset = self.file.metadata()?.len();
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(offset)
    }

    /// Truncate the log back to exactly `offset` bytes.
    pub fn truncate_to(&mut self, offset: u64) -> Result<()> {
        self.file.set_len(offset)?;
        self.file.seek(SeekFrom::End(0))?;
        Ok(())
    }

    /// Seek to `offset` and read one line, decoding a `BlockRecord`.
    pub fn read_at(&mut self, offset: u64) -> Result<BlockRecord> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            return Err(NodeError::ChainStore(format!("no record at offset {offset}")));
        }
        let trimmed = line.trim_end_matches('\n');
        serde_json::from_str(trimmed)
            .map_err(|e| NodeError::ChainStore(format!("corrupt chain log line at offset {offset}: {e}")))
    }

    pub fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Read every byte of the underlying file — used by tests that want
    /// to assert on raw on-disk layout.
    #[cfg(test)]
    pub(crate) fn raw_contents(&mut self) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}
