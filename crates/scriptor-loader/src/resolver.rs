//! Module specifier resolution.
//!
//! `resolve(specifier, from_dir, roots)` maps a specifier to a host binding or
//! a concrete file. Only existence checks and `package.json` reads touch the
//! filesystem. The compiler host uses the same probing so compile-time and
//! load-time resolution agree.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::bridge::{HostModule, host_module};
use crate::error::{LoaderError, LoaderResult};
use crate::search_roots::SearchRootList;

/// Extension preference: script, then compiled, then data.
pub const EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "mjs", "cjs", "json"];

/// Extensions that need transpiling before they can run.
pub const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];

const PACKAGE_MANIFEST: &str = "package.json";
const INDEX_STEM: &str = "index";

/// What kind of specifier this is, before any filesystem access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecifierKind {
    /// Served by the host; never resolved on disk.
    Host(HostModule),
    /// Starts with `.` or `/`; resolved against the importing directory.
    Relative,
    /// Bare package name, resolved against the search roots.
    Package,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A host binding.
    Host(HostModule),
    /// A file on disk, lexically normalized.
    File(PathBuf),
}

/// Classify a specifier.
#[must_use]
pub fn classify(specifier: &str) -> SpecifierKind {
    if let Some(module) = host_module(specifier) {
        SpecifierKind::Host(module)
    } else if specifier.starts_with('.') || specifier.starts_with('/') {
        SpecifierKind::Relative
    } else {
        SpecifierKind::Package
    }
}

/// Resolve `specifier` as imported from a file in `from_dir`.
///
/// # Errors
///
/// Returns [`LoaderError::NotFound`] listing every directory consulted.
pub fn resolve(specifier: &str, from_dir: &Path, roots: &SearchRootList) -> LoaderResult<Resolved> {
    match classify(specifier) {
        SpecifierKind::Host(module) => Ok(Resolved::Host(module)),
        SpecifierKind::Relative => {
            let base = normalize(&from_dir.join(specifier));
            probe_file(&base)
                .map(Resolved::File)
                .ok_or_else(|| LoaderError::NotFound {
                    specifier: specifier.to_owned(),
                    searched: vec![from_dir.to_path_buf()],
                })
        },
        SpecifierKind::Package => {
            let (package, subpath) = split_package(specifier);
            if !package.is_empty() {
                for root in roots.iter() {
                    if let Some(found) = probe_package(&root.join(&package), &subpath) {
                        debug!(
                            specifier,
                            root = %root.display(),
                            path = %found.display(),
                            "resolved package specifier"
                        );
                        return Ok(Resolved::File(found));
                    }
                }
            }
            Err(LoaderError::NotFound {
                specifier: specifier.to_owned(),
                searched: roots.as_slice().to_vec(),
            })
        },
    }
}

/// Split a package specifier into `(package_name, subpath)`.
///
/// A leading `@scope` segment belongs to the package name.
#[must_use]
pub fn split_package(specifier: &str) -> (String, String) {
    let (take, limit) = if specifier.starts_with('@') { (2, 3) } else { (1, 2) };
    let mut segments = specifier.splitn(limit, '/');
    let name: Vec<&str> = segments.by_ref().take(take).collect();
    let rest = segments.next().unwrap_or_default();
    (name.join("/"), rest.to_owned())
}

/// Probe one candidate base path: exact file, appended extensions, the
/// script twin of a compiled extension, then a directory index.
#[must_use]
pub fn probe_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }
    if let Some(found) = with_extensions(base) {
        return Some(found);
    }
    if let Some(found) = script_twin(base) {
        return Some(found);
    }
    if base.is_dir() {
        return with_extensions(&base.join(INDEX_STEM));
    }
    None
}

/// Whether a resolved file needs the transpiler.
#[must_use]
pub fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e))
}

/// Lexically remove `.` and `..` components.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                },
                Some(Component::RootDir | Component::Prefix(_)) => {},
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn probe_package(package_dir: &Path, subpath: &str) -> Option<PathBuf> {
    if !subpath.is_empty() {
        return probe_file(&package_dir.join(subpath));
    }
    if package_dir.is_file() {
        return Some(package_dir.to_path_buf());
    }
    if let Some(found) = with_extensions(package_dir) {
        return Some(found);
    }
    if !package_dir.is_dir() {
        return None;
    }
    if let Some(main) = manifest_entry(package_dir)
        && let Some(found) = probe_file(&normalize(&package_dir.join(main)))
    {
        return Some(found);
    }
    with_extensions(&package_dir.join(INDEX_STEM))
}

fn manifest_entry(package_dir: &Path) -> Option<String> {
    let path = package_dir.join(PACKAGE_MANIFEST);
    let text = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(manifest) => manifest
            .get("main")
            .and_then(serde_json::Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_owned),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring unreadable package manifest");
            None
        },
    }
}

fn with_extensions(base: &Path) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| append_extension(base, ext))
        .find(|candidate| candidate.is_file())
}

/// `./util.js` written in a script file refers to `./util.ts`.
fn script_twin(base: &Path) -> Option<PathBuf> {
    let twins: &[&str] = match base.extension().and_then(|e| e.to_str())? {
        "js" => &["ts", "tsx"],
        "mjs" => &["mts"],
        "cjs" => &["cts"],
        _ => return None,
    };
    twins
        .iter()
        .map(|ext| base.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

fn append_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn file(resolved: Resolved) -> PathBuf {
        match resolved {
            Resolved::File(p) => p,
            Resolved::Host(h) => panic!("expected a file, got {h:?}"),
        }
    }

    #[test]
    fn first_root_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        touch(&a.join("shared/index.js"));
        touch(&b.join("shared/index.js"));

        let roots = SearchRootList::new([a.clone(), b]);
        let got = file(resolve("shared", dir.path(), &roots).unwrap());
        assert_eq!(got, a.join("shared/index.js"));
    }

    #[test]
    fn later_root_used_when_earlier_misses() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir_all(&a).unwrap();
        touch(&b.join("only-b.ts"));

        let roots = SearchRootList::new([a, b.clone()]);
        assert_eq!(
            file(resolve("only-b", dir.path(), &roots).unwrap()),
            b.join("only-b.ts")
        );
    }

    #[test]
    fn script_extension_preferred_over_compiled() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("foo.ts"));
        touch(&dir.path().join("foo.js"));
        touch(&dir.path().join("foo.json"));

        let roots = SearchRootList::new(Vec::<PathBuf>::new());
        assert_eq!(
            file(resolve("./foo", dir.path(), &roots).unwrap()),
            dir.path().join("foo.ts")
        );
    }

    #[test]
    fn compiled_extension_preferred_over_data() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("cfg.json"));
        touch(&dir.path().join("cfg.cjs"));

        let roots = SearchRootList::new(Vec::<PathBuf>::new());
        assert_eq!(
            file(resolve("./cfg", dir.path(), &roots).unwrap()),
            dir.path().join("cfg.cjs")
        );
    }

    #[test]
    fn directory_index_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        touch(&root.join("pkg/index.ts"));

        let roots = SearchRootList::new([root.clone()]);
        assert_eq!(
            file(resolve("pkg", dir.path(), &roots).unwrap()),
            root.join("pkg/index.ts")
        );
    }

    #[test]
    fn manifest_main_beats_index() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        touch(&pkg.join("index.js"));
        touch(&pkg.join("lib/entry.js"));
        fs::write(pkg.join("package.json"), r#"{"name":"pkg","main":"./lib/entry"}"#).unwrap();

        let roots = SearchRootList::new([dir.path().to_path_buf()]);
        assert_eq!(
            file(resolve("pkg", dir.path(), &roots).unwrap()),
            pkg.join("lib/entry.js")
        );
    }

    #[test]
    fn broken_manifest_falls_back_to_index() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        touch(&pkg.join("index.js"));
        fs::write(pkg.join("package.json"), "{ not json").unwrap();

        let roots = SearchRootList::new([dir.path().to_path_buf()]);
        assert_eq!(
            file(resolve("pkg", dir.path(), &roots).unwrap()),
            pkg.join("index.js")
        );
    }

    #[test]
    fn scoped_package_with_subpath() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("@acme/tools/src/strings.ts"));

        let roots = SearchRootList::new([dir.path().to_path_buf()]);
        assert_eq!(
            file(resolve("@acme/tools/src/strings", dir.path(), &roots).unwrap()),
            dir.path().join("@acme/tools/src/strings.ts")
        );
    }

    #[test]
    fn split_package_handles_scopes() {
        assert_eq!(split_package("lodash"), ("lodash".into(), String::new()));
        assert_eq!(split_package("lodash/fp/map"), ("lodash".into(), "fp/map".into()));
        assert_eq!(split_package("@scope/pkg"), ("@scope/pkg".into(), String::new()));
        assert_eq!(split_package("@scope/pkg/a/b"), ("@scope/pkg".into(), "a/b".into()));
    }

    #[test]
    fn js_specifier_finds_ts_source() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("util.ts"));

        let roots = SearchRootList::new(Vec::<PathBuf>::new());
        assert_eq!(
            file(resolve("./util.js", dir.path(), &roots).unwrap()),
            dir.path().join("util.ts")
        );
    }

    #[test]
    fn relative_parent_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("shared.ts"));
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();

        let roots = SearchRootList::new(Vec::<PathBuf>::new());
        assert_eq!(
            file(resolve("../shared", &nested, &roots).unwrap()),
            dir.path().join("shared.ts")
        );
    }

    #[test]
    fn relative_ignores_search_roots() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        touch(&root.join("helper.ts"));
        let from = dir.path().join("src");
        fs::create_dir_all(&from).unwrap();

        let roots = SearchRootList::new([root]);
        match resolve("./helper", &from, &roots) {
            Err(LoaderError::NotFound { searched, .. }) => assert_eq!(searched, vec![from]),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn not_found_reports_every_root() {
        let dir = tempfile::tempdir().unwrap();
        let roots = SearchRootList::new([dir.path().join("a"), dir.path().join("b")]);
        match resolve("missing", dir.path(), &roots) {
            Err(LoaderError::NotFound { specifier, searched }) => {
                assert_eq!(specifier, "missing");
                assert_eq!(searched, roots.as_slice().to_vec());
            },
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn host_specifiers_skip_the_filesystem() {
        let roots = SearchRootList::new([PathBuf::from("/definitely/not/here")]);
        let from = Path::new("/nowhere");
        assert_eq!(
            resolve("scriptor", from, &roots).unwrap(),
            Resolved::Host(HostModule::Api)
        );
        assert_eq!(
            resolve("node:fs", from, &roots).unwrap(),
            Resolved::Host(HostModule::Platform("fs"))
        );
    }

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn script_detection() {
        assert!(is_script(Path::new("a.ts")));
        assert!(is_script(Path::new("a.mts")));
        assert!(!is_script(Path::new("a.js")));
        assert!(!is_script(Path::new("a")));
    }
}
