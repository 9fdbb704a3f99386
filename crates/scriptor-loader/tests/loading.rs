//! Dependency Loader and Sandbox Builder behaviour inside a live session.

use std::path::PathBuf;

use scriptor_loader::{CompilerOptions, DefaultHostApi, LoaderError, LoaderOptions, LoaderSession};
use scriptor_test::{TestWorkspace, setup_test_logging_default};
use serde_json::json;

fn session(ws: &TestWorkspace) -> LoaderSession {
    setup_test_logging_default();
    let roots = LoaderOptions::for_workspace(ws.root()).search_roots();
    LoaderSession::new(roots, CompilerOptions::default()).unwrap()
}

fn snippet_path(ws: &TestWorkspace) -> PathBuf {
    ws.scan_dir().join("snippet.js")
}

#[test]
fn same_path_yields_same_exports_and_one_transpile() {
    let ws = TestWorkspace::new();
    ws.script(
        "lib/counter.ts",
        "let count: number = 0;\nexport function next(): number {\n  count += 1;\n  return count;\n}\n",
    );
    let session = session(&ws);

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const a = require('./lib/counter');\n\
             const b = require('./lib/counter.ts');\n\
             module.exports = { same: a === b, first: a.next(), second: b.next() };",
        )
        .unwrap();
    assert_eq!(result, json!({ "same": true, "first": 1, "second": 2 }));
    assert_eq!(session.transpile_count(), 1);

    session.require(&snippet_path(&ws), "./lib/counter").unwrap();
    assert_eq!(session.transpile_count(), 1);
    assert!(session.is_loaded(&ws.scan_dir().join("lib/counter.ts")));
}

#[test]
fn circular_require_sees_partial_exports() {
    let ws = TestWorkspace::new();
    ws.script(
        "x.ts",
        "exports.a = 1;\nconst y = require(\"./y\");\nexports.b = 2;\nexports.fromY = y.seen;\n",
    );
    ws.script(
        "y.ts",
        "const x = require(\"./x\");\nexports.seen = { a: x.a, b: x.b, bIsUndefined: x.b === undefined };\n",
    );
    let session = session(&ws);

    let x = session.require(&snippet_path(&ws), "./x").unwrap();
    assert_eq!(x["a"], 1);
    assert_eq!(x["b"], 2);
    assert_eq!(x["fromY"], json!({ "a": 1, "bIsUndefined": true }));
    assert_eq!(session.cached_modules(), 2);
}

#[test]
fn failed_module_is_evicted_and_retried() {
    let ws = TestWorkspace::new();
    let flaky = ws.script(
        "lib/flaky.ts",
        "import fs from \"fs\";\n\
         if (!fs.existsSync(__dirname + \"/ready\")) {\n  throw new Error(\"not ready\");\n}\n\
         export const ok = true;\n",
    );
    let session = session(&ws);

    let err = session.require(&snippet_path(&ws), "./lib/flaky").unwrap_err();
    assert!(matches!(err, LoaderError::Execution { ref message, .. } if message.contains("not ready")), "{err}");
    assert!(!session.is_loaded(&flaky));

    ws.script("lib/ready", "");
    let ok = session.require(&snippet_path(&ws), "./lib/flaky").unwrap();
    assert_eq!(ok, json!({ "ok": true }));
    assert!(session.is_loaded(&flaky));
    assert_eq!(session.transpile_count(), 2);
}

#[test]
fn unresolved_package_error_names_every_root() {
    let ws = TestWorkspace::new();
    let session = session(&ws);

    let message = session
        .evaluate(
            &snippet_path(&ws),
            "try { require('left-pad'); module.exports = 'loaded'; } catch (e) { module.exports = e.message; }",
        )
        .unwrap();
    let message = message.as_str().unwrap();
    assert!(message.contains("Cannot find module 'left-pad'"), "{message}");
    for root in session.roots().iter() {
        assert!(message.contains(&root.display().to_string()), "{message}");
    }
}

#[test]
fn host_api_is_one_shared_object() {
    let ws = TestWorkspace::new();
    ws.script("lib/uses-host.ts", "import host from \"scriptor\";\nexport { host };\n");
    let host = DefaultHostApi::new();
    let roots = LoaderOptions::for_workspace(ws.root()).search_roots();
    let session = LoaderSession::with_host(roots, CompilerOptions::default(), host.clone()).unwrap();

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const api = require('scriptor');\n\
             api.registerCommand('demo.run', function () { return 1; });\n\
             module.exports = {\n\
               same: api === require('./lib/uses-host').host,\n\
               version: typeof api.version,\n\
             };",
        )
        .unwrap();
    assert_eq!(result, json!({ "same": true, "version": "string" }));
    assert_eq!(host.commands(), ["demo.run"]);
}

#[test]
fn platform_modules_touch_the_real_disk() {
    let ws = TestWorkspace::new();
    let session = session(&ws);

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const fs = require('fs');\n\
             const path = require('node:path');\n\
             const target = path.join(__dirname, 'data', 'note.txt');\n\
             fs.mkdirSync(path.dirname(target), { recursive: true });\n\
             fs.writeFileSync(target, 'hello');\n\
             module.exports = {\n\
               text: fs.readFileSync(target, 'utf8'),\n\
               base: path.basename(target, '.txt'),\n\
               listed: fs.readdirSync(path.dirname(target)),\n\
               platform: typeof require('process').platform,\n\
             };",
        )
        .unwrap();
    assert_eq!(
        result,
        json!({ "text": "hello", "base": "note", "listed": ["note.txt"], "platform": "string" })
    );
    assert_eq!(
        std::fs::read_to_string(ws.scan_dir().join("data/note.txt")).unwrap(),
        "hello"
    );
}

#[test]
fn sandboxed_global_writes_stay_local_but_packages_are_trusted() {
    let ws = TestWorkspace::new();
    ws.script("lib/leaky.ts", "globalThis.leaked = 1;\nexport const own = globalThis.leaked;\n");
    ws.package(
        &ws.scan_dir(),
        "trusted",
        None,
        &[("index.js", "globalThis.trustedFlag = true;\nmodule.exports = 'ok';\n")],
    );
    let session = session(&ws);

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const own = require('./lib/leaky').own;\n\
             const pkg = require('trusted');\n\
             module.exports = {\n\
               own: own,\n\
               leaked: typeof leaked,\n\
               pkg: pkg,\n\
               trusted: typeof trustedFlag === 'boolean' && trustedFlag,\n\
             };",
        )
        .unwrap();
    assert_eq!(
        result,
        json!({ "own": 1, "leaked": "undefined", "pkg": "ok", "trusted": true })
    );
    // Only the relative script dependency went through the transpiler.
    assert_eq!(session.transpile_count(), 1);
}

#[test]
fn json_and_mjs_dependencies_load_without_transpile() {
    let ws = TestWorkspace::new();
    ws.script("data/settings.json", "{ \"level\": 3, \"tags\": [\"a\"] }");
    ws.script("lib/esm.mjs", "export const answer = 42;\nexport default 'esm';\n");
    let session = session(&ws);

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const esm = require('./lib/esm.mjs');\n\
             module.exports = { settings: require('./data/settings'), answer: esm.answer, def: esm.default };",
        )
        .unwrap();
    assert_eq!(
        result,
        json!({ "settings": { "level": 3, "tags": ["a"] }, "answer": 42, "def": "esm" })
    );
    assert_eq!(session.transpile_count(), 0);
}

#[test]
fn timers_and_promises_settle_in_virtual_time() {
    let ws = TestWorkspace::new();
    let session = session(&ws);

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const order = [];\n\
             setTimeout(function () { order.push('late'); }, 50);\n\
             const cancelled = setTimeout(function () { order.push('cancelled'); }, 20);\n\
             setTimeout(function (tag) { order.push(tag); }, 10, 'early');\n\
             clearTimeout(cancelled);\n\
             Promise.resolve().then(function () { order.push('microtask'); });\n\
             module.exports = new Promise(function (resolve) {\n\
               setTimeout(function () { resolve(order); }, 100);\n\
             });",
        )
        .unwrap();
    assert_eq!(result, json!(["microtask", "early", "late"]));
    assert_eq!(session.pending_timers(), 0);
}

#[test]
fn module_records_link_parent_and_children() {
    let ws = TestWorkspace::new();
    let parent = ws.script(
        "lib/parent.ts",
        "import { parentId } from \"./child\";\n\
         export const seen = parentId;\n\
         export const childCount = module.children.length;\n\
         export const loadedDuringRun = module.loaded;\n",
    );
    ws.script("lib/child.ts", "export const parentId = module.parent ? module.parent.id : null;\n");
    let session = session(&ws);

    let result = session.require(&snippet_path(&ws), "./lib/parent").unwrap();
    assert_eq!(
        result,
        json!({
            "seen": parent.display().to_string(),
            "childCount": 1,
            "loadedDuringRun": false,
        })
    );

    let own = session
        .evaluate(
            &snippet_path(&ws),
            "module.exports = { id: module.id, parent: module.parent, paths: module.paths.length };",
        )
        .unwrap();
    assert_eq!(own["id"], json!(snippet_path(&ws).display().to_string()));
    assert_eq!(own["parent"], json!(null));
    assert_eq!(own["paths"], json!(session.roots().len()));
}

#[test]
fn evaluated_snippet_is_parent_of_what_it_requires() {
    let ws = TestWorkspace::new();
    let child = ws.script("lib/child.ts", "export const parentId = module.parent ? module.parent.id : null;\n");
    let session = session(&ws);

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const child = require('./lib/child');\n\
             module.exports = { parentId: child.parentId, children: module.children.map(function (c) { return c.id; }) };",
        )
        .unwrap();
    let snippet = snippet_path(&ws).display().to_string();
    let child = child.display().to_string();
    assert_eq!(result, json!({ "parentId": snippet, "children": [child] }));
    // The snippet itself still is not cached.
    assert!(!session.is_loaded(&snippet_path(&ws)));
}

#[test]
fn retried_dependency_is_listed_once_among_children() {
    let ws = TestWorkspace::new();
    ws.script(
        "lib/flaky.ts",
        "import fs from \"fs\";\n\
         if (!fs.existsSync(__dirname + \"/ready\")) {\n  throw new Error(\"not ready\");\n}\n\
         export const ok = true;\n",
    );
    let session = session(&ws);

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const fs = require('fs');\n\
             function attempt() {\n  try { return require('./lib/flaky').ok; } catch (e) { return 'failed'; }\n}\n\
             const first = attempt();\n\
             const afterFailure = module.children.length;\n\
             fs.writeFileSync(__dirname + '/lib/ready', '');\n\
             const second = attempt();\n\
             module.exports = { first: first, afterFailure: afterFailure, second: second, children: module.children.length };",
        )
        .unwrap();
    assert_eq!(
        result,
        json!({ "first": "failed", "afterFailure": 0, "second": true, "children": 1 })
    );
}

#[test]
fn module_syntax_inside_template_text_survives_loading() {
    let ws = TestWorkspace::new();
    ws.script(
        "lib/help.ts",
        "export const help = `usage:\nexport default nothing\nimport x from \"y\"\n`;\n",
    );
    ws.script("lib/base.ts", "export class Base {\n  kind(): string {\n    return \"base\";\n  }\n}\n");
    ws.script(
        "lib/derived.ts",
        "import { Base } from \"./base\";\nexport default class extends Base {\n  name(): string {\n    return \"derived\";\n  }\n}\n",
    );
    let session = session(&ws);

    let help = session.require(&snippet_path(&ws), "./lib/help").unwrap();
    assert_eq!(help, json!({ "help": "usage:\nexport default nothing\nimport x from \"y\"\n" }));

    let result = session
        .evaluate(
            &snippet_path(&ws),
            "const Derived = require('./lib/derived').default;\n\
             const value = new Derived();\n\
             module.exports = [value.kind(), value.name()];",
        )
        .unwrap();
    assert_eq!(result, json!(["base", "derived"]));
}
