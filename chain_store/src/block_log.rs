use std::{
    io::{BufRead as _, BufReader, BufWriter, ErrorKind, Write as _},
    path::Path,
};

use anyhow::{Context as _, Result};
use fs_err::{File, OpenOptions};
use types::Block;

const BLOCK_LOG_FILE: &str = "blocks.jsonl";

/// Append-only log of accepted blocks, one JSON object per line.
pub struct BlockLog {
    writer: BufWriter<File>,
    dirty: bool,
}

impl BlockLog {
    pub fn open(directory: &Path) -> Result<(Self, Vec<Block>)> {
        fs_err::create_dir_all(directory)?;

        let path = directory.join(BLOCK_LOG_FILE);
        let blocks = read_blocks(&path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let log = Self {
            writer: BufWriter::new(file),
            dirty: false,
        };

        Ok((log, blocks))
    }

    pub fn append(&mut self, block: &Block) -> Result<()> {
        serde_json::to_writer(&mut self.writer, block)?;
        self.writer.write_all(b"\n")?;
        self.dirty = true;
        Ok(())
    }

    /// Returns `true` if anything was written.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        self.writer.flush()?;
        self.dirty = false;

        Ok(true)
    }

    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

fn read_blocks(path: &Path) -> Result<Vec<Block>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(error) => return Err(error.into()),
    };

    BufReader::new(file)
        .lines()
        .enumerate()
        .filter(|(_, line)| line.as_ref().map_or(true, |line| !line.trim().is_empty()))
        .map(|(index, line)| {
            let line = line?;
            serde_json::from_str(&line)
                .with_context(|| format!("{path:?} line {} is not a valid block", index + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn appended_blocks_are_read_back_in_order() -> Result<()> {
        let directory = TempDir::new()?;
        let genesis = Block::genesis();
        let blocks = factory::chain(&genesis, 2, 1_700_000_100, 0);

        let (mut log, existing) = BlockLog::open(directory.path())?;

        assert!(existing.is_empty());
        assert!(!log.flush()?);

        for block in &blocks {
            log.append(block)?;
        }

        assert!(log.flush()?);
        log.close()?;

        let (_, existing) = BlockLog::open(directory.path())?;

        assert_eq!(existing, [(*blocks[0]).clone(), (*blocks[1]).clone()]);

        Ok(())
    }

    #[test]
    fn corrupted_line_is_reported() -> Result<()> {
        let directory = TempDir::new()?;

        fs_err::write(directory.path().join(BLOCK_LOG_FILE), "{}\n")?;

        let error = BlockLog::open(directory.path())
            .err()
            .expect("log with an invalid line cannot be opened");

        assert!(error.to_string().contains("line 1"));

        Ok(())
    }
}
