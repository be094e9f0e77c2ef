//! The repository context: one value owning the object database, the
//! reference store, configuration, the lazily loaded index and the filter
//! registry, plus the repository-level operations built on them (HEAD
//! state, branches, tags, commits, notes, revision expressions, fetch
//! bookkeeping).
//!
//! Readers such as revision walkers and differs borrow `&Repository`;
//! everything that mutates shared on-disk state goes through the ref
//! store's compare-and-swap primitives, so a `Repository` can be shared
//! between threads for reading.

pub mod attributes;
mod branch;
mod commit;
mod discover;
mod error;
pub mod filter;
mod head;
mod init;
mod notes;
pub mod remote;
mod revparse;
mod tag;
pub mod workdir;

pub use attributes::{AttrValue, AttributeTable, Attributes};
pub use branch::{Branch, BranchKind};
pub use discover::is_git_dir;
pub use error::RepoError;
pub use filter::{CrlfFilter, Filter, FilterDirection, FilterList, FilterRegistry, FilterSource};
pub use head::{HeadState, RepositoryState};
pub use init::{InitOptions, DEFAULT_BRANCH};
pub use notes::{Note, DEFAULT_NOTES_REF};
pub use remote::{
    Credential, CredentialProvider, CredentialType, FetchHeadEntry, FetchOutcome, Transport,
    TransportError,
};
pub use tag::TagRef;
pub use workdir::{FsWorkdir, MemoryWorkdir, Workdir, WorkdirFile};

use std::path::{Path, PathBuf};

use grove_config::ConfigSet;
use grove_hash::HashAlgorithm;
use grove_index::Index;
use grove_odb::ObjectDatabase;
use grove_ref::{FilesRefStore, ReflogMode};
use grove_utils::Signature;
use tracing::debug;

use discover::Located;

pub struct Repository {
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
    odb: ObjectDatabase,
    refs: FilesRefStore,
    config: ConfigSet,
    /// Loaded on first access.
    index: Option<Index>,
    filters: FilterRegistry,
    hash_algo: HashAlgorithm,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("git_dir", &self.git_dir)
            .field("work_tree", &self.work_tree)
            .field("hash_algo", &self.hash_algo)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open the repository at `path`, which names either the git dir or the
    /// root of a work tree.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::load(discover::open(path.as_ref())?)
    }

    /// Find the repository containing `start` by walking up the directory
    /// tree.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::load(discover::discover(start.as_ref(), &[])?)
    }

    /// [`discover`](Self::discover), never looking at or above any of
    /// `ceilings`.
    pub fn discover_with_ceilings(start: impl AsRef<Path>, ceilings: &[PathBuf]) -> Result<Self, RepoError> {
        Self::load(discover::discover(start.as_ref(), ceilings)?)
    }

    pub fn init(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::init_opts(path, &InitOptions::default())
    }

    pub fn init_bare(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let options = InitOptions {
            bare: true,
            ..Default::default()
        };
        Self::init_opts(path, &options)
    }

    pub fn init_opts(path: impl AsRef<Path>, options: &InitOptions) -> Result<Self, RepoError> {
        Self::load(init::init_repository(path.as_ref(), options)?)
    }

    fn load(located: Located) -> Result<Self, RepoError> {
        let Located { git_dir, work_tree } = located;
        let config = ConfigSet::load(&git_dir)?;

        let hash_algo = config
            .get_string("extensions.objectformat")?
            .and_then(|name| HashAlgorithm::from_name(&name))
            .unwrap_or_default();
        let mut odb = ObjectDatabase::open(git_dir.join("objects"), hash_algo)?;
        if let Some(level) = config.get_int("core.compression")? {
            odb.set_compression(level);
        }

        let mut refs = FilesRefStore::new(&git_dir);
        let log_setting = config.get_string("core.logallrefupdates")?;
        let reflog_mode = match log_setting {
            None if work_tree.is_none() => ReflogMode::Off,
            other => ReflogMode::from_config(other.as_deref()),
        };
        refs.set_reflog_mode(reflog_mode);
        if let (Some(name), Some(email)) = (config.get_string("user.name")?, config.get_string("user.email")?) {
            refs.set_identity(name, email);
        }

        let mut filters = FilterRegistry::new();
        filters.register(CrlfFilter, 0)?;
        let attribute_files = [
            work_tree.as_ref().map(|w| w.join(".gitattributes")),
            Some(git_dir.join("info").join("attributes")),
        ];
        for path in attribute_files.into_iter().flatten().filter(|p| p.is_file()) {
            let text = std::fs::read(&path)?;
            filters.add_attributes(&text);
        }

        debug!(git_dir = %git_dir.display(), bare = work_tree.is_none(), "opened repository");
        Ok(Self {
            git_dir,
            work_tree,
            odb,
            refs,
            config,
            index: None,
            filters,
            hash_algo,
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// `None` for a bare repository.
    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.work_tree.is_none()
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algo
    }

    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    pub fn refs(&self) -> &FilesRefStore {
        &self.refs
    }

    pub fn refs_mut(&mut self) -> &mut FilesRefStore {
        &mut self.refs
    }

    pub fn config(&self) -> &ConfigSet {
        &self.config
    }

    /// Changes to `user.*` take effect on the ref store's reflog identity
    /// only after [`reload_identity`](Self::reload_identity).
    pub fn config_mut(&mut self) -> &mut ConfigSet {
        &mut self.config
    }

    /// Re-read `user.name` and `user.email` into the ref store.
    pub fn reload_identity(&mut self) -> Result<(), RepoError> {
        if let (Some(name), Some(email)) = (
            self.config.get_string("user.name")?,
            self.config.get_string("user.email")?,
        ) {
            self.refs.set_identity(name, email);
        }
        Ok(())
    }

    /// The configured identity stamped with the current time.
    pub fn signature(&self) -> Result<Signature, RepoError> {
        match (self.config.get_string("user.name")?, self.config.get_string("user.email")?) {
            (Some(name), Some(email)) => Ok(Signature::now(name, email)?),
            _ => Err(RepoError::MissingIdentity),
        }
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterRegistry {
        &mut self.filters
    }

    /// The work tree as a [`Workdir`].
    pub fn workdir(&self) -> Result<FsWorkdir, RepoError> {
        self.work_tree
            .as_ref()
            .map(FsWorkdir::new)
            .ok_or(RepoError::BareNoWorkTree)
    }

    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    /// The index, read from disk on first use.
    pub fn index(&mut self) -> Result<&Index, RepoError> {
        Ok(self.index_mut()?)
    }

    pub fn index_mut(&mut self) -> Result<&mut Index, RepoError> {
        let index = match self.index.take() {
            Some(index) => index,
            None => Index::read_or_default(self.index_path(), self.hash_algo)?,
        };
        Ok(self.index.insert(index))
    }

    pub fn set_index(&mut self, index: Index) {
        self.index = Some(index);
    }

    /// Write the in-memory index, if one was loaded or set.
    pub fn write_index(&self) -> Result<(), RepoError> {
        if let Some(index) = &self.index {
            index.write_to(self.index_path())?;
        }
        Ok(())
    }

    /// Drop the cached index and read it again.
    pub fn reload_index(&mut self) -> Result<&Index, RepoError> {
        self.index = None;
        self.index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_is_send_and_sync() {
        fn check<T: Send + Sync>() {}
        check::<Repository>();
    }
}
