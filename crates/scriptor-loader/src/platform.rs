//! Platform primitives handed to loaded code.
//!
//! These are the host's real implementations, not stubs: `fs` reads and
//! writes the actual disk and `process.env` is the real environment.
//! Strings stand in for byte buffers.

use std::path::{Component, Path, PathBuf};

use rquickjs::convert::Coerced;
use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Exception, Function, Object, Value};

use crate::resolver::normalize;

/// Build the platform module `name` (`fs`, `path`, `process` or `os`).
pub(crate) fn build<'js>(ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Object<'js>> {
    match name {
        "fs" => fs_module(ctx),
        "path" => path_module(ctx),
        "process" => process_module(ctx),
        "os" => os_module(ctx),
        other => Err(Exception::throw_message(
            ctx,
            &format!("no platform module named '{other}'"),
        )),
    }
}

fn throw_io(ctx: &Ctx<'_>, syscall: &str, path: &str, err: &std::io::Error) -> rquickjs::Error {
    let code = match err.kind() {
        std::io::ErrorKind::NotFound => "ENOENT",
        std::io::ErrorKind::PermissionDenied => "EACCES",
        std::io::ErrorKind::AlreadyExists => "EEXIST",
        _ => "EIO",
    };
    Exception::throw_message(ctx, &format!("{code}: {err}, {syscall} '{path}'"))
}

fn fs_module<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let fs = Object::new(ctx.clone())?;

    fs.set(
        "readFileSync",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String, _encoding: Opt<Value<'js>>| -> rquickjs::Result<String> {
                std::fs::read_to_string(&path).map_err(|e| throw_io(&ctx, "open", &path, &e))
            },
        )?,
    )?;

    fs.set(
        "writeFileSync",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String, data: Coerced<String>| -> rquickjs::Result<()> {
                std::fs::write(&path, data.0).map_err(|e| throw_io(&ctx, "open", &path, &e))
            },
        )?,
    )?;

    fs.set(
        "appendFileSync",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String, data: Coerced<String>| -> rquickjs::Result<()> {
                use std::io::Write;
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .and_then(|mut f| f.write_all(data.0.as_bytes()))
                    .map_err(|e| throw_io(&ctx, "open", &path, &e))
            },
        )?,
    )?;

    fs.set(
        "existsSync",
        Function::new(ctx.clone(), |path: String| Path::new(&path).exists())?,
    )?;

    fs.set(
        "readdirSync",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String| -> rquickjs::Result<Vec<String>> {
                let entries = std::fs::read_dir(&path).map_err(|e| throw_io(&ctx, "scandir", &path, &e))?;
                let mut names: Vec<String> = entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                Ok(names)
            },
        )?,
    )?;

    fs.set(
        "mkdirSync",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String, options: Opt<Value<'js>>| -> rquickjs::Result<()> {
                let recursive = options
                    .0
                    .and_then(|v| v.into_object())
                    .and_then(|o| o.get::<_, bool>("recursive").ok())
                    .unwrap_or(false);
                let result = if recursive {
                    std::fs::create_dir_all(&path)
                } else {
                    std::fs::create_dir(&path)
                };
                result.map_err(|e| throw_io(&ctx, "mkdir", &path, &e))
            },
        )?,
    )?;

    fs.set(
        "unlinkSync",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String| -> rquickjs::Result<()> {
                std::fs::remove_file(&path).map_err(|e| throw_io(&ctx, "unlink", &path, &e))
            },
        )?,
    )?;

    fs.set(
        "statSync",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String| -> rquickjs::Result<Object<'js>> {
                let meta = std::fs::metadata(&path).map_err(|e| throw_io(&ctx, "stat", &path, &e))?;
                let stat = Object::new(ctx.clone())?;
                #[allow(clippy::cast_precision_loss)]
                stat.set("size", meta.len() as f64)?;
                let (is_file, is_dir) = (meta.is_file(), meta.is_dir());
                stat.set("isFile", Function::new(ctx.clone(), move || is_file)?)?;
                stat.set("isDirectory", Function::new(ctx.clone(), move || is_dir)?)?;
                Ok(stat)
            },
        )?,
    )?;

    Ok(fs)
}

fn path_module<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let path = Object::new(ctx.clone())?;
    path.set("sep", std::path::MAIN_SEPARATOR_STR)?;
    path.set("delimiter", if cfg!(windows) { ";" } else { ":" })?;

    path.set(
        "join",
        Function::new(ctx.clone(), |parts: Rest<String>| join_paths(&parts.0))?,
    )?;
    path.set(
        "resolve",
        Function::new(ctx.clone(), |parts: Rest<String>| resolve_paths(&parts.0))?,
    )?;
    path.set(
        "normalize",
        Function::new(ctx.clone(), |p: String| display(&normalize(Path::new(&p))))?,
    )?;
    path.set("dirname", Function::new(ctx.clone(), |p: String| dirname(&p))?)?;
    path.set(
        "basename",
        Function::new(ctx.clone(), |p: String, ext: Opt<String>| basename(&p, ext.0.as_deref()))?,
    )?;
    path.set("extname", Function::new(ctx.clone(), |p: String| extname(&p))?)?;
    path.set(
        "isAbsolute",
        Function::new(ctx.clone(), |p: String| Path::new(&p).is_absolute())?,
    )?;
    path.set(
        "relative",
        Function::new(ctx.clone(), |from: String, to: String| relative(&from, &to))?,
    )?;

    Ok(path)
}

fn process_module<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let process = Object::new(ctx.clone())?;

    let env = Object::new(ctx.clone())?;
    for (key, value) in std::env::vars() {
        env.set(key, value)?;
    }
    process.set("env", env)?;
    process.set("platform", node_platform())?;
    process.set("arch", std::env::consts::ARCH)?;
    process.set("pid", std::process::id())?;
    process.set("argv", std::env::args().collect::<Vec<_>>())?;

    process.set(
        "cwd",
        Function::new(ctx.clone(), |ctx: Ctx<'js>| -> rquickjs::Result<String> {
            std::env::current_dir()
                .map(|d| display(&d))
                .map_err(|e| throw_io(&ctx, "uv_cwd", ".", &e))
        })?,
    )?;
    process.set(
        "exit",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, _code: Opt<Value<'js>>| -> rquickjs::Result<()> {
            Err(Exception::throw_message(
                &ctx,
                "process.exit is not available to loaded scripts",
            ))
        })?,
    )?;

    Ok(process)
}

fn os_module<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let os = Object::new(ctx.clone())?;
    os.set("EOL", if cfg!(windows) { "\r\n" } else { "\n" })?;
    os.set(
        "homedir",
        Function::new(ctx.clone(), || {
            directories::BaseDirs::new()
                .map(|d| display(d.home_dir()))
                .unwrap_or_default()
        })?,
    )?;
    os.set(
        "tmpdir",
        Function::new(ctx.clone(), || display(&std::env::temp_dir()))?,
    )?;
    os.set("platform", Function::new(ctx.clone(), node_platform)?)?;
    os.set("arch", Function::new(ctx.clone(), || std::env::consts::ARCH)?)?;
    Ok(os)
}

fn node_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn or_dot(s: String) -> String {
    if s.is_empty() { ".".to_owned() } else { s }
}

pub(crate) fn join_paths(parts: &[String]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("/");
    or_dot(display(&normalize(Path::new(&joined))))
}

pub(crate) fn resolve_paths(parts: &[String]) -> String {
    let mut out = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    for part in parts.iter().filter(|p| !p.is_empty()) {
        out.push(part);
    }
    display(&normalize(&out))
}

pub(crate) fn dirname(p: &str) -> String {
    match Path::new(p).parent() {
        Some(parent) if parent.as_os_str().is_empty() => ".".to_owned(),
        Some(parent) => display(parent),
        None if Path::new(p).has_root() => p.to_owned(),
        None => ".".to_owned(),
    }
}

pub(crate) fn basename(p: &str, ext: Option<&str>) -> String {
    let name = Path::new(p)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match ext {
        Some(ext) if name.len() > ext.len() => name.strip_suffix(ext).unwrap_or(&name).to_owned(),
        _ => name,
    }
}

pub(crate) fn extname(p: &str) -> String {
    Path::new(p)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

pub(crate) fn relative(from: &str, to: &str) -> String {
    let from = PathBuf::from(resolve_paths(&[from.to_owned()]));
    let to = PathBuf::from(resolve_paths(&[to.to_owned()]));
    let from_parts: Vec<Component<'_>> = from.components().collect();
    let to_parts: Vec<Component<'_>> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from_parts.len() {
        out.push("..");
    }
    for part in to_parts.iter().skip(common) {
        out.push(part.as_os_str());
    }
    display(&out)
}
