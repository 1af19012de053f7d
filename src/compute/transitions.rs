//! Transition dictionary - corpus statistics of which 5x5 start patches
//! precede a given 5x5 end patch after a fixed number of steps.
//!
//! End patches are stored in canonical orientation; start patches are stored
//! in the orientation that canonicalized their end patch, so a lookup can map
//! a sampled predecessor back into the query's own orientation.
//!
//! # File format
//!
//! One record per line:
//!
//! ```text
//! end_patch,total_frequency[,start_patch,start_frequency]*
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;

use super::persist::write_atomically;
use super::{Board, Patch, PatchError};

/// Errors raised while building, loading or saving dictionaries.
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Start board is {start:?} but end board is {end:?}")]
    ShapeMismatch {
        start: (usize, usize),
        end: (usize, usize),
    },
    #[error("No transition dictionary available for {steps} steps")]
    Missing { steps: usize },
    #[error("Dictionary was built for {found} steps, expected {expected}")]
    StepMismatch { expected: usize, found: usize },
}

/// Why one dictionary record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record has no predecessor entries")]
    Empty,
    #[error("record has an unmatched trailing field")]
    UnmatchedTrailing,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error("end patch {0} is not in canonical orientation")]
    NonCanonicalKey(u32),
    #[error("stored total {stored} does not match entry sum {sum}")]
    TotalMismatch { stored: u64, sum: u64 },
    #[error("frequency must be positive")]
    ZeroFrequency,
    #[error("end patch {0} already has a record")]
    DuplicateKey(u32),
}

/// A record that was skipped while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// 1-based line number.
    pub line: usize,
    pub error: RecordError,
}

/// Outcome of loading a dictionary file.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Records accepted.
    pub records: usize,
    /// Records rejected, with reasons.
    pub skipped: Vec<SkippedRecord>,
}

/// Observed predecessors of one canonical end patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredecessorList {
    total: u64,
    /// Sorted by descending frequency, then ascending patch.
    entries: Vec<(Patch, u64)>,
}

impl PredecessorList {
    fn from_counts(counts: HashMap<Patch, u64>) -> Self {
        let mut entries: Vec<(Patch, u64)> = counts.into_iter().collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let total = entries.iter().map(|&(_, freq)| freq).sum();
        Self { total, entries }
    }

    /// Sum of all predecessor frequencies.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Predecessors in descending frequency order.
    pub fn entries(&self) -> &[(Patch, u64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draw one predecessor with probability proportional to its frequency.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Patch {
        if self.total == 0 {
            return Patch::EMPTY;
        }
        let mut target = rng.gen_range(0..self.total);
        for &(patch, freq) in &self.entries {
            if target < freq {
                return patch;
            }
            target -= freq;
        }
        self.entries.last().map_or(Patch::EMPTY, |&(patch, _)| patch)
    }
}

/// Accumulates (start, end) pairs into a dictionary.
#[derive(Debug, Clone)]
pub struct TransitionBuilder {
    steps: usize,
    pairs: usize,
    counts: HashMap<Patch, HashMap<Patch, u64>>,
}

impl TransitionBuilder {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            pairs: 0,
            counts: HashMap::new(),
        }
    }

    /// Record every cell position of one pair that is `steps` generations apart.
    pub fn add_pair(&mut self, start: &Board, end: &Board) -> Result<(), DictionaryError> {
        if !start.same_shape(end) {
            return Err(DictionaryError::ShapeMismatch {
                start: (start.width(), start.height()),
                end: (end.width(), end.height()),
            });
        }
        for y in 0..end.height() {
            for x in 0..end.width() {
                let (key, orientation) = Patch::extract(end, x, y).canonical();
                let predecessor = orientation.apply(Patch::extract(start, x, y));
                *self
                    .counts
                    .entry(key)
                    .or_default()
                    .entry(predecessor)
                    .or_insert(0) += 1;
            }
        }
        self.pairs += 1;
        Ok(())
    }

    /// Number of pairs accepted so far.
    pub fn pairs(&self) -> usize {
        self.pairs
    }

    /// Freeze into an immutable dictionary.
    pub fn finish(self) -> TransitionDictionary {
        let table = self
            .counts
            .into_iter()
            .map(|(key, counts)| (key, PredecessorList::from_counts(counts)))
            .collect();
        TransitionDictionary {
            steps: self.steps,
            table,
        }
    }
}

/// Map from canonical end patch to its observed predecessors, for one step count.
#[derive(Debug, Clone)]
pub struct TransitionDictionary {
    steps: usize,
    table: HashMap<Patch, PredecessorList>,
}

impl TransitionDictionary {
    /// Empty dictionary; every lookup misses.
    pub fn empty(steps: usize) -> Self {
        Self {
            steps,
            table: HashMap::new(),
        }
    }

    /// Build from (start, end) pairs that are `steps` generations apart.
    ///
    /// Pairs with mismatched board shapes are skipped with a warning.
    pub fn build<'a, I>(pairs: I, steps: usize) -> Self
    where
        I: IntoIterator<Item = (&'a Board, &'a Board)>,
    {
        let mut builder = TransitionBuilder::new(steps);
        for (index, (start, end)) in pairs.into_iter().enumerate() {
            if let Err(err) = builder.add_pair(start, end) {
                log::warn!("Skipping training pair {}: {}", index, err);
            }
        }
        log::debug!(
            "Built {}-step dictionary from {} pairs ({} end patches)",
            steps,
            builder.pairs(),
            builder.counts.len()
        );
        builder.finish()
    }

    /// Step count this dictionary describes.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of distinct canonical end patches.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Total number of recorded observations.
    pub fn observations(&self) -> u64 {
        self.table.values().map(PredecessorList::total).sum()
    }

    /// Entry for a canonical end patch.
    pub fn get(&self, canonical: Patch) -> Option<&PredecessorList> {
        self.table.get(&canonical)
    }

    /// Entry for any end patch, canonicalizing first.
    pub fn lookup(&self, patch: Patch) -> Option<&PredecessorList> {
        self.get(patch.canonical_key())
    }

    /// Iterate over (canonical end patch, predecessors).
    pub fn iter(&self) -> impl Iterator<Item = (Patch, &PredecessorList)> {
        self.table.iter().map(|(&key, list)| (key, list))
    }

    /// Sample a predecessor for `patch` in the query's own orientation.
    ///
    /// Returns `None` when the end patch was never observed.
    pub fn sample<R: Rng + ?Sized>(&self, patch: Patch, rng: &mut R) -> Option<Patch> {
        let (key, orientation) = patch.canonical();
        self.table
            .get(&key)
            .map(|list| orientation.inverse().apply(list.sample(rng)))
    }

    /// Write records in ascending end-patch order.
    pub fn write_to<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut writer = BufWriter::new(writer);
        let mut keys: Vec<&Patch> = self.table.keys().collect();
        keys.sort_unstable();
        for key in keys {
            let list = &self.table[key];
            write!(writer, "{},{}", key.bits(), list.total)?;
            for &(patch, freq) in &list.entries {
                write!(writer, ",{},{}", patch.bits(), freq)?;
            }
            writeln!(writer)?;
        }
        writer.flush()
    }

    /// Read records, skipping malformed lines.
    ///
    /// The first record for an end patch wins; later ones are skipped.
    pub fn read_from<R: BufRead>(
        reader: R,
        steps: usize,
    ) -> Result<(Self, LoadReport), DictionaryError> {
        let mut table = HashMap::new();
        let mut report = LoadReport::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = parse_record(&line).and_then(|(key, list)| match table.entry(key) {
                Entry::Occupied(_) => Err(RecordError::DuplicateKey(key.bits())),
                Entry::Vacant(slot) => {
                    slot.insert(list);
                    Ok(())
                }
            });
            match parsed {
                Ok(()) => report.records += 1,
                Err(error) => {
                    log::warn!("Skipping dictionary record on line {}: {}", index + 1, error);
                    report.skipped.push(SkippedRecord {
                        line: index + 1,
                        error,
                    });
                }
            }
        }

        Ok((Self { steps, table }, report))
    }

    /// Save to a file, replacing it atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DictionaryError> {
        write_atomically(path.as_ref(), |writer| self.write_to(writer))?;
        Ok(())
    }

    /// Load from a file.
    pub fn load<P: AsRef<Path>>(
        path: P,
        steps: usize,
    ) -> Result<(Self, LoadReport), DictionaryError> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file), steps)
    }
}

fn parse_number(field: &str) -> Result<u64, RecordError> {
    field
        .trim()
        .parse()
        .map_err(|_| RecordError::InvalidNumber(field.to_string()))
}

fn parse_record(line: &str) -> Result<(Patch, PredecessorList), RecordError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 4 {
        return Err(if fields.len() == 3 {
            RecordError::UnmatchedTrailing
        } else {
            RecordError::Empty
        });
    }
    if fields.len() % 2 != 0 {
        return Err(RecordError::UnmatchedTrailing);
    }

    let key = Patch::try_from(parse_number(fields[0])?)?;
    if !key.is_canonical() {
        return Err(RecordError::NonCanonicalKey(key.bits()));
    }
    let stored = parse_number(fields[1])?;

    let mut entries = Vec::with_capacity(fields.len() / 2 - 1);
    for pair in fields[2..].chunks_exact(2) {
        let patch = Patch::try_from(parse_number(pair[0])?)?;
        let freq = parse_number(pair[1])?;
        if freq == 0 {
            return Err(RecordError::ZeroFrequency);
        }
        entries.push((patch, freq));
    }

    let sum: u64 = entries.iter().map(|&(_, freq)| freq).sum();
    if sum != stored {
        return Err(RecordError::TotalMismatch { stored, sum });
    }
    entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    Ok((
        key,
        PredecessorList {
            total: stored,
            entries,
        },
    ))
}

/// One step count's dictionary, filled at most once.
type Slot = Arc<Mutex<Option<Arc<TransitionDictionary>>>>;

/// Per-step-count dictionaries, loaded lazily and shared read-only.
///
/// Files live in one directory as `transition-{steps}.csv`. The library-wide
/// lock only guards the slot map; loading or building a dictionary holds its
/// own slot, so callers for other step counts never wait on the disk.
#[derive(Debug, Default)]
pub struct TransitionLibrary {
    dir: Option<PathBuf>,
    slots: Mutex<HashMap<usize, Slot>>,
}

impl TransitionLibrary {
    /// Library backed by a directory of dictionary files.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: Some(dir.as_ref().to_path_buf()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Library without persistence; dictionaries must be inserted or built.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File path used for `steps`, if the library has a directory.
    pub fn path_for(&self, steps: usize) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("transition-{}.csv", steps)))
    }

    /// Register an already built dictionary.
    pub fn insert(&self, dictionary: TransitionDictionary) -> Arc<TransitionDictionary> {
        let dictionary = Arc::new(dictionary);
        let slot = self.slot(dictionary.steps());
        *lock(&slot) = Some(Arc::clone(&dictionary));
        dictionary
    }

    /// Cached dictionary for `steps`, without touching the disk.
    pub fn get(&self, steps: usize) -> Option<Arc<TransitionDictionary>> {
        let slot = lock(&self.slots).get(&steps).cloned()?;
        lock(&slot).clone()
    }

    /// Cached dictionary, loading it from disk on first use.
    pub fn get_or_load(&self, steps: usize) -> Result<Arc<TransitionDictionary>, DictionaryError> {
        let slot = self.slot(steps);
        let mut cached = lock(&slot);
        if let Some(dictionary) = cached.as_ref() {
            return Ok(Arc::clone(dictionary));
        }

        let dictionary = Arc::new(self.load_stored(steps)?);
        *cached = Some(Arc::clone(&dictionary));
        Ok(dictionary)
    }

    /// Cached or stored dictionary; otherwise build one from `pairs` and save it.
    ///
    /// Concurrent callers for the same step count build and save only once.
    pub fn get_or_build<'a, I>(
        &self,
        steps: usize,
        pairs: I,
    ) -> Result<Arc<TransitionDictionary>, DictionaryError>
    where
        I: IntoIterator<Item = (&'a Board, &'a Board)>,
    {
        let slot = self.slot(steps);
        let mut cached = lock(&slot);
        if let Some(dictionary) = cached.as_ref() {
            return Ok(Arc::clone(dictionary));
        }

        let dictionary = match self.load_stored(steps) {
            Ok(dictionary) => dictionary,
            Err(DictionaryError::Missing { .. }) => {
                let dictionary = TransitionDictionary::build(pairs, steps);
                if let Some(path) = self.path_for(steps) {
                    dictionary.save(&path)?;
                    log::info!("Saved {}-step dictionary to {}", steps, path.display());
                }
                dictionary
            }
            Err(e) => return Err(e),
        };

        let dictionary = Arc::new(dictionary);
        *cached = Some(Arc::clone(&dictionary));
        Ok(dictionary)
    }

    fn load_stored(&self, steps: usize) -> Result<TransitionDictionary, DictionaryError> {
        let path = self
            .path_for(steps)
            .filter(|path| path.exists())
            .ok_or(DictionaryError::Missing { steps })?;
        let (dictionary, report) = TransitionDictionary::load(&path, steps)?;
        log::info!(
            "Loaded {}-step dictionary from {} ({} records, {} skipped)",
            steps,
            path.display(),
            report.records,
            report.skipped.len()
        );
        Ok(dictionary)
    }

    fn slot(&self, steps: usize) -> Slot {
        Arc::clone(lock(&self.slots).entry(steps).or_default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
