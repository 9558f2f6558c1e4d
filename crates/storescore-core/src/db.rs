//! File-backed record storage.
//!
//! Every record type maps to a collection directory under the store root and
//! every record to one pretty-printed JSON file named after its id:
//! `<root>/<collection>/<id>.json`. Writes go through a temp file plus rename
//! so readers never observe a half-written record.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::{
    Analysis, ChatSession, CreditEntry, Error, Result, Store, User, WebhookEvent,
};

pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

macro_rules! record {
    ($ty:ty, $collection:literal) => {
        impl Record for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

record!(User, "users");
record!(Store, "stores");
record!(Analysis, "analyses");
record!(ChatSession, "chats");
record!(CreditEntry, "credits");
record!(WebhookEvent, "webhook-events");

#[derive(Debug, Clone)]
pub struct Db {
    root: PathBuf,
}

impl Db {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir<T: Record>(&self) -> PathBuf {
        self.root.join(T::COLLECTION)
    }

    fn record_path<T: Record>(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.collection_dir::<T>().join(format!("{}.json", id)))
    }

    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let path = self.record_path::<T>(id)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`Db::get`] but a missing record is an error.
    pub fn require<T: Record>(&self, id: &str) -> Result<T> {
        self.get(id)?.ok_or_else(|| Error::NotFound {
            collection: T::COLLECTION,
            id: id.to_string(),
        })
    }

    pub fn put<T: Record>(&self, record: &T) -> Result<()> {
        let id = record.id();
        let path = self.record_path::<T>(id)?;
        let dir = self.collection_dir::<T>();
        fs::create_dir_all(&dir)?;
        let tmp = dir.join(format!(".{}.json.tmp", id));
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Returns whether a record was actually removed.
    pub fn delete<T: Record>(&self, id: &str) -> Result<bool> {
        let path = self.record_path::<T>(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list<T: Record>(&self) -> Result<Vec<T>> {
        let dir = self.collection_dir::<T>();
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            let parsed = fs::read_to_string(entry.path())
                .map_err(Error::from)
                .and_then(|raw| serde_json::from_str::<T>(&raw).map_err(Error::from));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping unreadable {} record {}: {}", T::COLLECTION, name, e),
            }
        }
        Ok(records)
    }

    pub fn find<T, F>(&self, pred: F) -> Result<Vec<T>>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        Ok(self.list::<T>()?.into_iter().filter(|r| pred(r)).collect())
    }

    pub fn find_one<T, F>(&self, pred: F) -> Result<Option<T>>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        Ok(self.list::<T>()?.into_iter().find(|r| pred(r)))
    }
}

/// Ids become file names, so only a conservative character set is allowed.
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidId(id.to_string()))
    }
}
