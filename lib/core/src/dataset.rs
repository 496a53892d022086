use crate::{Error, Result};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// A row of a dataset, one value per column
#[derive(Debug, Clone, Default)]
pub struct DatasetTuple {
    pub data: Vec<f64>,
}

impl DatasetTuple {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f64>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Canonical string form, used as a set-membership key
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Lexicographic total order over the values; on a common prefix the
    /// shorter tuple sorts first
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.data
            .iter()
            .map(|v| OrderedFloat(*v))
            .cmp(other.data.iter().map(|v| OrderedFloat(*v)))
    }
}

impl PartialEq for DatasetTuple {
    fn eq(&self, other: &Self) -> bool {
        self.data.len() == other.data.len()
            && self.data.iter().zip(other.data.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for DatasetTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:.5}", v)?;
        }
        Ok(())
    }
}

impl From<Vec<f64>> for DatasetTuple {
    fn from(data: Vec<f64>) -> Self {
        Self::new(data)
    }
}

/// Parsed contents of a dataset file
#[derive(Debug, Clone, Default)]
pub struct DatasetContent {
    pub header: Vec<String>,
    pub tuples: Vec<DatasetTuple>,
}

/// Handle to a tabular data file.
///
/// Each handle gets a random id at construction; two handles on the same
/// path are different datasets. The file is parsed on the first [`Dataset::read`]
/// and the result is kept for the lifetime of the handle.
#[derive(Debug)]
pub struct Dataset {
    id: Uuid,
    path: PathBuf,
    content: OnceLock<DatasetContent>,
}

impl Dataset {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.as_ref().to_path_buf(),
            content: OnceLock::new(),
        }
    }

    /// Dataset whose contents are already in memory
    pub fn from_content<P: AsRef<Path>>(path: P, content: DatasetContent) -> Self {
        let dataset = Self::new(path);
        let _ = dataset.content.set(content);
        dataset
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.content.get().is_some()
    }

    /// Parse the file into memory. Later calls return the cached contents.
    pub fn read(&self) -> Result<&DatasetContent> {
        if let Some(content) = self.content.get() {
            return Ok(content);
        }
        let parsed = parse_file(&self.path)?;
        Ok(self.content.get_or_init(|| parsed))
    }

    pub fn header(&self) -> Result<&[String]> {
        Ok(&self.read()?.header)
    }

    pub fn tuples(&self) -> Result<&[DatasetTuple]> {
        Ok(&self.read()?.tuples)
    }

    /// Number of tuples
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.tuples.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Dataset {}

impl Hash for Dataset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn parse_file(path: &Path) -> Result<DatasetContent> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, 0, e))?;

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, 1, e))?
        .iter()
        .map(|s| s.to_string())
        .collect();
    if header.is_empty() || (header.len() == 1 && header[0].is_empty()) {
        return Err(Error::Parse {
            path: path.to_path_buf(),
            line: 1,
            message: "file without contents".to_string(),
        });
    }

    let mut tuples = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        // header is line 1
        let line = idx + 2;
        let record = record.map_err(|e| csv_error(path, line, e))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let mut data = Vec::with_capacity(record.len());
        for field in record.iter() {
            let value = field.parse::<f64>().map_err(|e| Error::Parse {
                path: path.to_path_buf(),
                line,
                message: format!("{:?}: {}", field, e),
            })?;
            data.push(value);
        }
        tuples.push(DatasetTuple::new(data));
    }

    Ok(DatasetContent { header, tuples })
}

fn csv_error(path: &Path, line: usize, err: csv::Error) -> Error {
    let line = err
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(line);
    match err.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        kind => Error::Parse {
            path: path.to_path_buf(),
            line,
            message: format!("{:?}", kind),
        },
    }
}

/// List the regular files of a directory as datasets, sorted by path
pub fn discover_datasets<P: AsRef<Path>>(dir: P) -> Result<Vec<Arc<Dataset>>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    tracing::debug!("Discovered {} datasets in {:?}", paths.len(), dir.as_ref());
    Ok(paths.into_iter().map(|p| Arc::new(Dataset::new(p))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", "x,y\n1.0,2.0\n3.5, 4\n\n");
        let dataset = Dataset::new(&path);
        assert!(!dataset.is_loaded());

        let content = dataset.read().unwrap();
        assert_eq!(content.header, vec!["x", "y"]);
        assert_eq!(content.tuples.len(), 2);
        assert_eq!(content.tuples[1].data, vec![3.5, 4.0]);
        assert!(dataset.is_loaded());
    }

    #[test]
    fn test_read_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", "x\n1\n2\n");
        let dataset = Dataset::new(&path);
        assert_eq!(dataset.len().unwrap(), 2);

        // File changes are not picked up once loaded
        std::fs::remove_file(&path).unwrap();
        assert_eq!(dataset.len().unwrap(), 2);
    }

    #[test]
    fn test_malformed_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "bad.csv", "x,y\n1,2\n3,abc\n");
        let err = Dataset::new(&path).read().unwrap_err();
        match err {
            Error::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dataset = Dataset::new("/definitely/not/here.csv");
        assert!(dataset.read().is_err());
    }

    #[test]
    fn test_identity_is_by_id() {
        let a = Dataset::new("same.csv");
        let b = Dataset::new("same.csv");
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.path(), b.path());
    }

    #[test]
    fn test_tuple_serialization_and_equality() {
        let t = DatasetTuple::new(vec![1.0, 2.5, -0.123456]);
        assert_eq!(t.serialize(), "1.00000, 2.50000, -0.12346");
        assert_eq!(t, DatasetTuple::new(vec![1.0, 2.5, -0.123456]));
        assert_ne!(t, DatasetTuple::new(vec![1.0, 2.5]));
    }

    #[test]
    fn test_tuple_total_order() {
        let a = DatasetTuple::new(vec![1.0, 2.0]);
        let b = DatasetTuple::new(vec![1.0, 3.0]);
        let c = DatasetTuple::new(vec![1.0]);
        assert_eq!(a.total_cmp(&b), Ordering::Less);
        assert_eq!(b.total_cmp(&a), Ordering::Greater);
        assert_eq!(c.total_cmp(&a), Ordering::Less);
        assert_eq!(a.total_cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_discover_datasets() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "b.csv", "x\n1\n");
        write_csv(dir.path(), "a.csv", "x\n1\n");
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let datasets = discover_datasets(dir.path()).unwrap();
        assert_eq!(datasets.len(), 2);
        assert!(datasets[0].path().ends_with("a.csv"));
        assert!(datasets[1].path().ends_with("b.csv"));
    }
}
