//! The boundary with network transports. Only the interfaces live here: a
//! [`Transport`] fetches objects into the repository's object database and
//! reports the remote's refs; [`Repository::apply_fetch`] then records them
//! as remote-tracking refs in a single transaction.

use std::fmt::Write as _;
use std::path::PathBuf;

use grove_hash::ObjectId;
use grove_ref::{RefName, RefTransaction};
use grove_utils::ErrorKind;
use tracing::{debug, warn};

use crate::{RepoError, Repository};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("authentication failed for {0}")]
    Auth(String),

    #[error("no usable credentials for {0}")]
    NoCredentials(String),

    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("transport failure: {0}")]
    Failed(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) | Self::NoCredentials(_) | Self::UnsupportedUrl(_) => ErrorKind::InvalidArgument,
            Self::Failed(_) => ErrorKind::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialType {
    UserPassPlaintext,
    SshKey,
    SshCustom,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    UserPass {
        username: String,
        password: String,
    },
    SshKeyFile {
        username: String,
        public_key: Option<PathBuf>,
        private_key: PathBuf,
        passphrase: Option<String>,
    },
    SshKeyMemory {
        username: String,
        public_key: Option<String>,
        private_key: String,
        passphrase: Option<String>,
    },
}

impl Credential {
    pub fn username(&self) -> &str {
        match self {
            Self::UserPass { username, .. }
            | Self::SshKeyFile { username, .. }
            | Self::SshKeyMemory { username, .. } => username,
        }
    }

    pub fn credential_type(&self) -> CredentialType {
        match self {
            Self::UserPass { .. } => CredentialType::UserPassPlaintext,
            Self::SshKeyFile { .. } => CredentialType::SshKey,
            Self::SshKeyMemory { .. } => CredentialType::SshCustom,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("type", &self.credential_type())
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

pub trait CredentialProvider {
    /// A credential of one of the `allowed` types for `url`.
    fn credentials(
        &self,
        allowed: &[CredentialType],
        url: &str,
        username_hint: Option<&str>,
    ) -> Result<Credential, TransportError>;
}

impl<F> CredentialProvider for F
where
    F: Fn(&[CredentialType], &str, Option<&str>) -> Result<Credential, TransportError>,
{
    fn credentials(
        &self,
        allowed: &[CredentialType],
        url: &str,
        username_hint: Option<&str>,
    ) -> Result<Credential, TransportError> {
        self(allowed, url, username_hint)
    }
}

/// What a transport reports after a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Objects newly written to the object database.
    pub objects_written: usize,
    /// The remote's refs by their names on the remote
    /// (`refs/heads/main`, `refs/tags/v1`).
    pub updated_refs: Vec<(RefName, ObjectId)>,
}

pub trait Transport {
    fn fetch(&self, url: &str, credentials: &dyn CredentialProvider) -> Result<FetchOutcome, TransportError>;
}

/// One line of `FETCH_HEAD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchHeadEntry {
    pub oid: ObjectId,
    /// Candidate for merging (the fetched branch) rather than bookkeeping.
    pub is_merge: bool,
    /// `branch 'main'` or `tag 'v1'`.
    pub description: String,
    pub url: String,
}

impl FetchHeadEntry {
    fn render(&self) -> String {
        let marker = if self.is_merge { "" } else { "not-for-merge" };
        format!("{}\t{}\t{} of {}\n", self.oid, marker, self.description, self.url)
    }

    fn parse(line: &str) -> Result<Self, RepoError> {
        let bad = || RepoError::FetchHead(line.to_owned());
        let mut parts = line.splitn(3, '\t');
        let oid = parts.next().and_then(|h| ObjectId::from_hex(h).ok()).ok_or_else(bad)?;
        let marker = parts.next().ok_or_else(bad)?;
        let rest = parts.next().ok_or_else(bad)?;
        let (description, url) = rest.rsplit_once(" of ").ok_or_else(bad)?;
        Ok(Self {
            oid,
            is_merge: marker.is_empty(),
            description: description.to_owned(),
            url: url.to_owned(),
        })
    }
}

/// Where a remote's ref lands locally, or `None` for refs that are not
/// tracked (`HEAD`, pull requests, ...).
fn tracking_name(remote: &str, name: &RefName) -> Result<Option<RefName>, RepoError> {
    if let Some(branch) = name.as_str().strip_prefix("refs/heads/") {
        return Ok(Some(RefName::new(format!("refs/remotes/{remote}/{branch}"))?));
    }
    if name.is_tag() {
        return Ok(Some(name.clone()));
    }
    Ok(None)
}

impl Repository {
    /// Names of configured remotes.
    pub fn remotes(&self) -> Vec<String> {
        self.config
            .subsections("remote")
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn remote_url(&self, remote: &str) -> Result<String, RepoError> {
        self.config
            .get_string(&format!("remote.{remote}.url"))?
            .ok_or_else(|| RepoError::RemoteNotFound(remote.to_owned()))
    }

    /// Configure `remote` with the default fetch refspec.
    pub fn add_remote(&mut self, remote: &str, url: &str) -> Result<(), RepoError> {
        self.config.set(&format!("remote.{remote}.url"), url)?;
        self.config.set(
            &format!("remote.{remote}.fetch"),
            &format!("+refs/heads/*:refs/remotes/{remote}/*"),
        )?;
        Ok(())
    }

    /// Run `transport` against the configured url of `remote` and record
    /// the result with [`apply_fetch`](Self::apply_fetch).
    pub fn fetch(
        &self,
        remote: &str,
        transport: &dyn Transport,
        credentials: &dyn CredentialProvider,
    ) -> Result<Vec<RefName>, RepoError> {
        let url = self.remote_url(remote)?;
        debug!(remote, url = %url, "fetching");
        let outcome = transport.fetch(&url, credentials)?;
        self.apply_fetch(remote, &outcome)
    }

    /// Record a fetch: every reported object must already be in the object
    /// database, then all of `refs/remotes/<remote>/*` (and new tags) are
    /// updated in one transaction and `FETCH_HEAD` is rewritten. Returns the
    /// local refs that changed.
    ///
    /// Existing tags are never moved.
    pub fn apply_fetch(&self, remote: &str, outcome: &FetchOutcome) -> Result<Vec<RefName>, RepoError> {
        for (name, oid) in &outcome.updated_refs {
            if !self.odb.exists(oid) {
                return Err(RepoError::MissingObject {
                    name: name.to_string(),
                    oid: *oid,
                });
            }
        }

        let url = self.remote_url(remote).unwrap_or_else(|_| remote.to_owned());
        let message = format!("fetch: {url}");
        let mut tx: RefTransaction<'_> = self.refs.transaction();
        let mut changed = Vec::new();
        let mut fetch_head = Vec::new();

        for (name, oid) in &outcome.updated_refs {
            let Some(local) = tracking_name(remote, name)? else {
                continue;
            };
            let current = self.refs.resolve_name(&local).ok().flatten();
            if local.is_tag() {
                fetch_head.push(FetchHeadEntry {
                    oid: *oid,
                    is_merge: false,
                    description: format!("tag '{}'", name.short_name()),
                    url: url.clone(),
                });
                if current.is_some() {
                    if current != Some(*oid) {
                        warn!(tag = %local, "remote moved an existing tag; keeping the local one");
                    }
                    continue;
                }
            } else {
                fetch_head.push(FetchHeadEntry {
                    oid: *oid,
                    is_merge: fetch_head.iter().all(|e: &FetchHeadEntry| !e.is_merge),
                    description: format!("branch '{}'", name.short_name()),
                    url: url.clone(),
                });
            }
            if current == Some(*oid) {
                continue;
            }
            let expected = Some(current.unwrap_or_else(|| self.hash_algo.null_oid()));
            tx.update(local.clone(), *oid, expected, &message);
            changed.push(local);
        }

        if !tx.is_empty() {
            tx.commit()?;
        }
        self.write_fetch_head(&fetch_head)?;
        debug!(remote, updated = changed.len(), objects = outcome.objects_written, "applied fetch");
        Ok(changed)
    }

    fn write_fetch_head(&self, entries: &[FetchHeadEntry]) -> Result<(), RepoError> {
        let mut text = String::new();
        for entry in entries {
            let _ = write!(text, "{}", entry.render());
        }
        let mut lock = grove_utils::lockfile::LockFile::acquire(self.git_dir.join("FETCH_HEAD"))?;
        std::io::Write::write_all(&mut lock, text.as_bytes())?;
        lock.commit()?;
        Ok(())
    }

    /// Entries of `FETCH_HEAD`; empty when no fetch has happened.
    pub fn fetch_head(&self) -> Result<Vec<FetchHeadEntry>, RepoError> {
        let text = match std::fs::read_to_string(self.git_dir.join("FETCH_HEAD")) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|l| !l.is_empty())
            .map(FetchHeadEntry::parse)
            .collect()
    }
}
