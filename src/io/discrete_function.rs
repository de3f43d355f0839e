//! Sequential datasets of discrete functions on disk.
//!
//! A dataset is a directory holding one JSON file per function, named by its index in the dataset
//! (`0.json`, `1.json`, ...), and optionally a `metadata.json` describing how the functions were
//! computed.
use crate::space::DiscreteFunction;
use eyre::{eyre, WrapErr};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn entry_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}.json", index))
}

fn metadata_path(dir: &Path) -> PathBuf {
    dir.join("metadata.json")
}

/// Appends functions to a dataset.
#[derive(Debug)]
pub struct DiscreteFunctionWriter {
    dir: PathBuf,
    next_index: usize,
}

impl DiscreteFunctionWriter {
    /// Creates an empty dataset, discarding the entries of a previous dataset in the same directory.
    pub fn create(dir: impl Into<PathBuf>) -> eyre::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).wrap_err_with(|| format!("failed to create dataset {}", dir.display()))?;
        let mut index = 0;
        while entry_path(&dir, index).exists() {
            fs::remove_file(entry_path(&dir, index))?;
            index += 1;
        }
        if metadata_path(&dir).exists() {
            fs::remove_file(metadata_path(&dir))?;
        }
        Ok(Self { dir, next_index: 0 })
    }

    /// Writes the function as the next entry and returns its index.
    pub fn append(&mut self, function: &DiscreteFunction) -> eyre::Result<usize> {
        let index = self.next_index;
        let path = entry_path(&self.dir, index);
        let file = fs::File::create(&path).wrap_err_with(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, function).wrap_err_with(|| format!("failed to write {}", path.display()))?;
        writer.flush()?;
        self.next_index += 1;
        Ok(index)
    }

    /// Writes the metadata of the dataset, replacing earlier metadata.
    pub fn write_metadata<T: Serialize>(&self, metadata: &T) -> eyre::Result<()> {
        let path = metadata_path(&self.dir);
        let file = fs::File::create(&path).wrap_err_with(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, metadata)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        writer.flush()?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Reads functions back from a dataset.
#[derive(Debug)]
pub struct DiscreteFunctionReader {
    dir: PathBuf,
    len: usize,
}

impl DiscreteFunctionReader {
    pub fn open(dir: impl Into<PathBuf>) -> eyre::Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(eyre!("dataset {} does not exist", dir.display()));
        }
        let mut len = 0;
        while entry_path(&dir, len).is_file() {
            len += 1;
        }
        Ok(Self { dir, len })
    }

    /// Number of consecutive entries in the dataset.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read(&self, index: usize) -> eyre::Result<DiscreteFunction> {
        if index >= self.len {
            return Err(eyre!(
                "entry {} out of bounds for dataset {} with {} entries",
                index,
                self.dir.display(),
                self.len
            ));
        }
        let path = entry_path(&self.dir, index);
        let file = fs::File::open(&path).wrap_err_with(|| format!("failed to open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file)).wrap_err_with(|| format!("failed to parse {}", path.display()))
    }

    pub fn read_all(&self) -> eyre::Result<Vec<DiscreteFunction>> {
        (0..self.len).map(|index| self.read(index)).collect()
    }

    /// Reads the metadata of the dataset, or `None` if the dataset has none.
    pub fn read_metadata<T: DeserializeOwned>(&self) -> eyre::Result<Option<T>> {
        let path = metadata_path(&self.dir);
        if !path.is_file() {
            return Ok(None);
        }
        let file = fs::File::open(&path).wrap_err_with(|| format!("failed to open {}", path.display()))?;
        let metadata = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(metadata))
    }
}
