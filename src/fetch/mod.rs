pub mod keys;

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    cache::{Cache, CacheError},
    model::{
        attrs::{attrs, maybe_get_str, merge_attrs, Attr, Attrs, MergeError},
        input::{AttrName, Input},
        ParseError,
    },
    status::{get_repo_status, RepoStatus, StatusError},
    store::{Store, StoreError, StorePath},
    tool::{PijulTool, ToolError},
};

use self::keys::{base_key, impure_key, locked_key};

/// Directory holding Pijul's private repository state inside a working copy.
const PIJUL_DIR: &str = ".pijul";
const CHECKOUT_DIR: &str = "source";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Channel mismatch: requested {requested}, got {actual}")]
    ChannelMismatch { requested: String, actual: String },
    #[error("State mismatch: requested {requested}, got {actual}")]
    StateMismatch { requested: String, actual: String },
    #[error("Invalid input: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("Could not read repository status: {0}")]
    Status(#[from] StatusError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Input {0} does not refer to a local checkout")]
    NoSourcePath(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Resolves Pijul inputs to store paths, reusing earlier fetches through the
/// cache whenever the requested pin allows it.
pub struct PijulFetcher<T, C, S> {
    tool: T,
    cache: C,
    store: S,
}

impl<T, C, S> PijulFetcher<T, C, S>
where
    T: PijulTool,
    C: Cache,
    S: Store,
{
    pub fn new(tool: T, cache: C, store: S) -> Self {
        PijulFetcher { tool, cache, store }
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetches `input` and returns the artifact together with the input
    /// enriched with `channel`, `state` and `lastModified`.
    pub fn fetch(&self, input: &Input) -> Result<(StorePath, Input), FetchError> {
        info!("Fetching {}", input);
        let (store_path, info) = self.fetch_info(input)?;
        let input = merge_info(input, info)?;
        debug!("Resolved {} to {}", input, store_path);
        Ok((store_path, input))
    }

    fn fetch_info(&self, input: &Input) -> Result<(StorePath, Attrs), FetchError> {
        let name = input.name();
        let repo_url = input.base_url();
        let channel = input.channel();
        let state = input.state();

        let impure = impure_key(name, &repo_url);
        let requested = match (channel, state) {
            (Some(channel), Some(state)) if input.is_locked() => {
                Some(locked_key(name, channel, state))
            }
            _ => None,
        };

        if let Some(key) = &requested {
            if let Some((info, store_path)) = self.cache.lookup(&self.store, key)? {
                debug!("Using locked cache entry {} for {}", store_path, input);
                return Ok((store_path, info));
            }
        }

        if let Some((info, store_path)) = self.cache.lookup(&self.store, &impure)? {
            let channel_matches =
                channel.map_or(true, |c| maybe_get_str(&info, "channel") == Some(c));
            let state_matches =
                state.map_or(true, |s| maybe_get_str(&info, "state") == Some(s));
            if channel_matches && state_matches {
                debug!("Using cache entry {} for {}", store_path, repo_url);
                return Ok((store_path, info));
            }
            debug!(
                "Cache entry for {} does not match the requested pin, cloning",
                repo_url
            );
        }

        let (store_path, status) = self.clone_and_ingest(name, &repo_url, channel, state)?;

        let is_locked = requested.is_some();
        let mut key = requested.unwrap_or_else(|| base_key(name));
        merge_attrs(
            &mut key,
            attrs([
                ("channel", status.channel.as_str()),
                ("state", status.state.as_str()),
            ]),
        )?;

        let mut info = attrs([("channel", status.channel), ("state", status.state)]);
        info.insert(
            AttrName::LastModified.to_string(),
            Attr::from(status.last_modified),
        );

        if !is_locked {
            self.cache.add(&impure, &info, &store_path, false)?;
        }
        self.cache.add(&key, &info, &store_path, true)?;

        Ok((store_path, info))
    }

    fn clone_and_ingest(
        &self,
        name: &str,
        repo_url: &str,
        channel: Option<&str>,
        state: Option<&str>,
    ) -> Result<(StorePath, RepoStatus), FetchError> {
        // Removed on drop, whichever way this function returns.
        let scratch = tempfile::Builder::new().prefix("pijulfetch-").tempdir()?;
        let repo_dir = scratch.path().join(CHECKOUT_DIR);

        let mut args = vec!["clone".to_owned()];
        if let Some(channel) = channel {
            args.extend(["--channel".to_owned(), channel.to_owned()]);
        }
        if let Some(state) = state {
            args.extend(["--state".to_owned(), state.to_owned()]);
        }
        args.push(repo_url.to_owned());
        args.push(path_arg(&repo_dir));

        info!("Cloning {}", repo_url);
        self.tool.run(&args, None, None)?;

        let status = get_repo_status(&self.tool, &repo_dir)?;

        if let Some(channel) = channel {
            if channel != status.channel {
                return Err(FetchError::ChannelMismatch {
                    requested: channel.to_owned(),
                    actual: status.channel,
                });
            }
        }
        if let Some(state) = state {
            if state != status.state {
                return Err(FetchError::StateMismatch {
                    requested: state.to_owned(),
                    actual: status.state,
                });
            }
        }

        match std::fs::remove_dir_all(repo_dir.join(PIJUL_DIR)) {
            Err(error) if error.kind() != ErrorKind::NotFound => return Err(error.into()),
            _ => {}
        }

        let store_path = self.store.add_to_store(name, &repo_dir)?;
        Ok((store_path, status))
    }

    /// Schedules `file` for recording in the local checkout behind `input`,
    /// recording it right away when `commit_msg` is given.
    pub fn mark_changed_file(
        &self,
        input: &Input,
        file: &str,
        commit_msg: Option<&str>,
    ) -> Result<(), FetchError> {
        let source_path: PathBuf = input
            .source_path()
            .ok_or_else(|| FetchError::NoSourcePath(input.to_string()))?;

        let add = ["add", "--", file].map(String::from);
        self.tool.run(&add, Some(&source_path), None)?;

        if let Some(message) = commit_msg {
            let record = ["record", file, "-m", message].map(String::from);
            self.tool.run(&record, Some(&source_path), None)?;
        }
        Ok(())
    }
}

fn merge_info(input: &Input, info: Attrs) -> Result<Input, FetchError> {
    let mut merged = input.to_attrs();
    merge_attrs(&mut merged, info)?;
    let merged = Input::from_attrs(&merged)?
        .ok_or_else(|| ParseError::MissingAttribute(AttrName::Type.to_string()))?;
    Ok(merged.with_name(input.name()))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, fs};

    use super::*;

    use crate::{cache::FileCache, store::LocalStore};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        args: Vec<String>,
        cwd: Option<PathBuf>,
    }

    /// Pretends to be pijul: `clone` creates a working copy and the status
    /// commands report whatever `observed` holds.
    struct FakePijul {
        observed: RefCell<RepoStatus>,
        fail_clone: bool,
        calls: RefCell<Vec<Call>>,
    }

    impl FakePijul {
        fn new(channel: &str, state: &str, last_modified: u64) -> Self {
            FakePijul {
                observed: RefCell::new(RepoStatus {
                    channel: channel.to_owned(),
                    state: state.to_owned(),
                    last_modified,
                }),
                fail_clone: false,
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn clones(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| call.args[0] == "clone")
                .collect()
        }
    }

    impl PijulTool for FakePijul {
        fn run(
            &self,
            args: &[String],
            cwd: Option<&Path>,
            _input: Option<&str>,
        ) -> Result<String, ToolError> {
            self.calls.borrow_mut().push(Call {
                args: args.to_vec(),
                cwd: cwd.map(Path::to_path_buf),
            });
            let observed = self.observed.borrow();
            match args[0].as_str() {
                "clone" if self.fail_clone => Err(ToolError::Exit {
                    program: "pijul".to_owned(),
                    status: "exit status: 1".to_owned(),
                    stderr: "repository not found".to_owned(),
                }),
                "clone" => {
                    let dest = PathBuf::from(args.last().unwrap());
                    fs::create_dir_all(dest.join(PIJUL_DIR)).unwrap();
                    fs::write(dest.join(PIJUL_DIR).join("config"), "").unwrap();
                    fs::write(dest.join("README"), &observed.state).unwrap();
                    Ok(String::new())
                }
                "log" => Ok(format!(
                    r#"[{{"hash":"H","timestamp":"{}","state":"{}"}}]"#,
                    chrono::DateTime::from_timestamp(observed.last_modified as i64, 0)
                        .unwrap()
                        .to_rfc3339(),
                    observed.state
                )),
                "channel" => Ok(format!("  other\n* {}\n", observed.channel)),
                _ => Ok(String::new()),
            }
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        fetcher: PijulFetcher<FakePijul, FileCache, LocalStore>,
    }

    impl Fixture {
        fn new(tool: FakePijul) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let cache = FileCache::new(dir.path().join("cache")).unwrap();
            let store = LocalStore::new(dir.path().join("store")).unwrap();
            Fixture {
                dir,
                fetcher: PijulFetcher::new(tool, cache, store),
            }
        }

        fn tool(&self) -> &FakePijul {
            self.fetcher.tool()
        }

        fn entries(&self) -> Vec<crate::cache::CacheEntry> {
            let mut entries = self.fetcher.cache().entries().unwrap();
            entries.sort_by_key(|entry| entry.locked);
            entries
        }
    }

    fn input(url: &str) -> Input {
        Input::from_url(url).unwrap().unwrap()
    }

    fn info(channel: &str, state: &str, last_modified: u64) -> Attrs {
        let mut info = attrs([("channel", channel), ("state", state)]);
        info.insert("lastModified".to_owned(), Attr::Int(last_modified));
        info
    }

    #[test]
    fn unlocked_fetch_records_impure_and_locked_entries() {
        let f = Fixture::new(FakePijul::new("main", "s123", 1_700_000_000));
        let requested = input("pijul+https://example/repo");

        let (store_path, resolved) = f.fetcher.fetch(&requested).unwrap();

        let mut expected = requested.to_attrs();
        expected.extend(info("main", "s123", 1_700_000_000));
        assert_eq!(resolved.to_attrs(), expected);
        assert!(resolved.is_locked());

        let entries = f.entries();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].locked);
        assert_eq!(entries[0].key, impure_key("source", "https://example/repo"));
        assert!(entries[1].locked);
        assert_eq!(entries[1].key, locked_key("source", "main", "s123"));
        for entry in &entries {
            assert_eq!(entry.info, info("main", "s123", 1_700_000_000));
            assert_eq!(entry.store_path, store_path);
        }

        let tree = f.fetcher.store().to_real_path(&store_path);
        assert_eq!(fs::read_to_string(tree.join("README")).unwrap(), "s123");
        assert!(!tree.join(PIJUL_DIR).exists());
    }

    #[test]
    fn clone_passes_pins_and_status_runs_in_checkout() {
        let f = Fixture::new(FakePijul::new("dev", "S9", 1_700_000_000));
        f.fetcher
            .fetch(&input("pijul+https://example/repo?channel=dev&state=S9&depth=1"))
            .unwrap();

        let calls = f.tool().calls();
        assert_eq!(calls.len(), 3);
        let clone = &calls[0].args;
        assert_eq!(
            clone[..6].to_vec(),
            ["clone", "--channel", "dev", "--state", "S9", "https://example/repo"]
        );
        let checkout = PathBuf::from(&clone[6]);
        assert_eq!(calls[1].cwd.as_deref(), Some(checkout.as_path()));
        assert_eq!(calls[2].cwd.as_deref(), Some(checkout.as_path()));
        assert!(!checkout.exists());
    }

    #[test]
    fn locked_cache_hit_does_not_run_pijul() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        let tree = f.dir.path().join("tree");
        fs::create_dir(&tree).unwrap();
        fs::write(tree.join("README"), "cached").unwrap();
        let store_path = f.fetcher.store().add_to_store("source", &tree).unwrap();
        f.fetcher
            .cache()
            .add(
                &locked_key("source", "main", "S1"),
                &info("main", "S1", 42),
                &store_path,
                true,
            )
            .unwrap();

        let (fetched, resolved) = f
            .fetcher
            .fetch(&input("pijul+https://example/repo?channel=main&state=S1"))
            .unwrap();

        assert_eq!(fetched, store_path);
        assert_eq!(resolved.last_modified(), Some(42));
        assert!(f.tool().calls().is_empty());
    }

    #[test]
    fn locked_fetch_records_only_locked_entry() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        f.fetcher
            .fetch(&input("pijul+https://example/repo?channel=main&state=S1"))
            .unwrap();

        let entries = f.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].locked);
        assert_eq!(entries[0].key, locked_key("source", "main", "S1"));
    }

    #[test]
    fn impure_hit_is_reused_when_pins_match() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        let (first, _) = f.fetcher.fetch(&input("pijul+https://example/repo")).unwrap();
        let (again, _) = f.fetcher.fetch(&input("pijul+https://example/repo")).unwrap();
        let (on_main, resolved) = f
            .fetcher
            .fetch(&input("pijul+https://example/repo?channel=main"))
            .unwrap();

        assert_eq!(f.tool().clones().len(), 1);
        assert_eq!(again, first);
        assert_eq!(on_main, first);
        assert_eq!(resolved.state(), Some("S1"));
    }

    #[test]
    fn impure_hit_on_other_channel_clones() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        f.fetcher.fetch(&input("pijul+https://example/repo")).unwrap();

        *f.tool().observed.borrow_mut() = RepoStatus {
            channel: "dev".to_owned(),
            state: "S2".to_owned(),
            last_modified: 1_700_000_100,
        };
        let (_, resolved) = f
            .fetcher
            .fetch(&input("pijul+https://example/repo?channel=dev"))
            .unwrap();

        let clones = f.tool().clones();
        assert_eq!(clones.len(), 2);
        assert_eq!(clones[1].args[1..3].to_vec(), ["--channel", "dev"]);
        assert_eq!(resolved.channel(), Some("dev"));
        assert_eq!(resolved.state(), Some("S2"));
    }

    #[test]
    fn channel_mismatch_writes_nothing() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        let error = f
            .fetcher
            .fetch(&input("pijul+https://example/repo?channel=dev"))
            .unwrap_err();

        match error {
            FetchError::ChannelMismatch { requested, actual } => {
                assert_eq!(requested, "dev");
                assert_eq!(actual, "main");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(f.entries().is_empty());
        let checkout = PathBuf::from(f.tool().clones()[0].args.last().unwrap());
        assert!(!checkout.exists());
    }

    #[test]
    fn state_mismatch_writes_nothing() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        let error = f
            .fetcher
            .fetch(&input("pijul+https://example/repo?state=S0"))
            .unwrap_err();

        assert!(matches!(error, FetchError::StateMismatch { .. }));
        assert!(f.entries().is_empty());
    }

    #[test]
    fn clone_failure_is_reported_and_cleaned_up() {
        let mut tool = FakePijul::new("main", "S1", 1_700_000_000);
        tool.fail_clone = true;
        let f = Fixture::new(tool);

        let error = f
            .fetcher
            .fetch(&input("pijul+https://example/repo"))
            .unwrap_err();

        assert!(matches!(error, FetchError::Tool(ToolError::Exit { .. })));
        assert_eq!(f.tool().calls().len(), 1);
        let scratch = PathBuf::from(f.tool().calls()[0].args.last().unwrap());
        assert!(!scratch.parent().unwrap().exists());
        assert!(f.entries().is_empty());
    }

    #[test]
    fn conflicting_input_attribute_is_reported() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        let mut stale = attrs([("type", "pijul"), ("url", "https://example/repo")]);
        stale.insert("lastModified".to_owned(), Attr::Int(1));
        let stale = Input::from_attrs(&stale).unwrap().unwrap();

        let error = f.fetcher.fetch(&stale).unwrap_err();
        match error {
            FetchError::Merge(MergeError::AttributeConflict { key, .. }) => {
                assert_eq!(key, "lastModified")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn name_is_part_of_the_keys() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        let (store_path, resolved) = f
            .fetcher
            .fetch(&input("pijul+https://example/repo").with_name("docs"))
            .unwrap();

        assert_eq!(store_path.name(), "docs");
        assert_eq!(resolved.name(), "docs");
        let keys: Vec<Attrs> = f.entries().into_iter().map(|e| e.key).collect();
        assert_eq!(
            keys,
            vec![
                impure_key("docs", "https://example/repo"),
                locked_key("docs", "main", "S1")
            ]
        );
    }

    #[test]
    fn mark_changed_file_in_local_checkout() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        let local = Input::from_attrs(&attrs([("type", "pijul"), ("url", "file:///work/repo")]))
            .unwrap()
            .unwrap();

        f.fetcher
            .mark_changed_file(&local, "flake.lock", Some("Update lock"))
            .unwrap();

        let cwd = Some(PathBuf::from("/work/repo"));
        assert_eq!(
            f.tool().calls(),
            vec![
                Call {
                    args: ["add", "--", "flake.lock"].map(String::from).to_vec(),
                    cwd: cwd.clone(),
                },
                Call {
                    args: ["record", "flake.lock", "-m", "Update lock"]
                        .map(String::from)
                        .to_vec(),
                    cwd,
                },
            ]
        );
    }

    #[test]
    fn mark_changed_file_needs_local_checkout() {
        let f = Fixture::new(FakePijul::new("main", "S1", 1_700_000_000));
        let error = f
            .fetcher
            .mark_changed_file(&input("pijul+https://example/repo"), "file", None)
            .unwrap_err();
        assert!(matches!(error, FetchError::NoSourcePath(_)));
        assert!(f.tool().calls().is_empty());
    }
}
