use std::fs;
use std::path::Path;

use grove_config::ConfigSet;
use grove_hash::HashAlgorithm;
use grove_ref::RefName;
use tracing::debug;

use crate::discover::Located;
use crate::RepoError;

/// Branch HEAD points at in a fresh repository when neither the options nor
/// `init.defaultBranch` name one.
pub const DEFAULT_BRANCH: &str = "master";

/// Options for [`Repository::init_opts`](crate::Repository::init_opts).
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub bare: bool,
    /// Short branch name for the unborn HEAD.
    pub initial_head: Option<String>,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            bare: false,
            initial_head: None,
            hash_algorithm: HashAlgorithm::Sha1,
        }
    }
}

/// Lay out `objects/`, `refs/`, `HEAD`, `config` and `description` under
/// the git dir. Running it on an existing repository changes nothing.
pub(crate) fn init_repository(path: &Path, options: &InitOptions) -> Result<Located, RepoError> {
    let path = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };
    let (git_dir, work_tree) = if options.bare {
        (path.clone(), None)
    } else {
        (path.join(".git"), Some(path))
    };
    if git_dir.join("HEAD").is_file() {
        debug!(git_dir = %git_dir.display(), "reinitializing existing repository");
        return Ok(Located { git_dir, work_tree });
    }

    for dir in ["objects/info", "objects/pack", "refs/heads", "refs/tags", "info"] {
        fs::create_dir_all(git_dir.join(dir))?;
    }

    let mut config = String::from("[core]\n");
    let format_version = match options.hash_algorithm {
        HashAlgorithm::Sha1 => 0,
        HashAlgorithm::Sha256 => 1,
    };
    config.push_str(&format!("\trepositoryformatversion = {format_version}\n"));
    config.push_str("\tfilemode = true\n");
    config.push_str(&format!("\tbare = {}\n", options.bare));
    if !options.bare {
        config.push_str("\tlogallrefupdates = true\n");
    }
    if format_version > 0 {
        config.push_str(&format!(
            "[extensions]\n\tobjectformat = {}\n",
            options.hash_algorithm.name()
        ));
    }
    fs::write(git_dir.join("config"), config)?;
    fs::write(
        git_dir.join("description"),
        "Unnamed repository; edit this file 'description' to name the repository.\n",
    )?;

    let branch = match &options.initial_head {
        Some(name) => name.clone(),
        None => ConfigSet::load(&git_dir)?
            .get_string("init.defaultbranch")?
            .unwrap_or_else(|| DEFAULT_BRANCH.to_owned()),
    };
    let head = RefName::branch(&branch)?;
    fs::write(git_dir.join("HEAD"), format!("ref: {head}\n"))?;

    debug!(git_dir = %git_dir.display(), branch = %branch, bare = options.bare, "initialized repository");
    Ok(Located { git_dir, work_tree })
}
