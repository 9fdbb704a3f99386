//! End-to-end scans: discovery, compile, execute, register.

use scriptor_loader::{InMemoryRegistry, LoaderOptions, Orchestrator};
use scriptor_test::{
    TestWorkspace, broken_script, capability_script, setup_test_logging_default, throwing_script, unmarked_script,
};
use serde_json::json;

fn orchestrator(ws: &TestWorkspace) -> Orchestrator<InMemoryRegistry> {
    setup_test_logging_default();
    Orchestrator::new(InMemoryRegistry::new(), LoaderOptions::for_workspace(ws.root())).unwrap()
}

#[tokio::test]
async fn one_bad_file_does_not_stop_the_scan() {
    let ws = TestWorkspace::new();
    let a = ws.script("a.ts", &capability_script("alpha"));
    let b = ws.script("b.ts", &broken_script());
    let c = ws.script("c.ts", &capability_script("gamma"));
    let mut orch = orchestrator(&ws);

    let report = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(report.discovered, 3);
    assert_eq!(report.eligible, 3);
    assert_eq!(report.loaded, [a, c]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, b);
    assert!(report.failed[0].1.contains("compilation"), "{}", report.failed[0].1);

    let ids: Vec<_> = orch.registry().list().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["alpha", "gamma"]);
    // Nothing was emitted for the broken file.
    assert!(!ws.scan_dir().join("out/b.js").exists());
    assert!(ws.scan_dir().join("out/a.js").is_file());
}

#[tokio::test]
async fn unmarked_files_never_reach_the_compiler() {
    let ws = TestWorkspace::new();
    ws.script("tool.ts", &capability_script("tool"));
    ws.script("helpers.ts", &unmarked_script());
    let mut orch = orchestrator(&ws);

    let report = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.eligible, 1);
    assert_eq!(orch.compiler().invocations(), 1);
}

#[tokio::test]
async fn execution_failure_is_isolated_and_retried_on_rescan() {
    let ws = TestWorkspace::new();
    let ok = ws.script("ok.ts", &capability_script("ok"));
    let boom = ws.script("boom.ts", &throwing_script("kaboom"));
    let gated = ws.script(
        "gated.ts",
        "// @scriptor-register\n\
         import fs from \"fs\";\n\
         if (!fs.existsSync(__dirname + \"/go\")) {\n  throw new Error(\"gate closed\");\n}\n\
         export default { id: \"gated\" };\n",
    );
    let mut orch = orchestrator(&ws);

    let first = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(first.loaded, [ok.clone()]);
    let failed: Vec<_> = first.failed.iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(failed, [boom.clone(), gated.clone()]);
    assert!(first.failed[0].1.contains("kaboom"));

    ws.script("go", "");
    let second = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(second.loaded, [gated]);
    assert_eq!(second.failed.len(), 1);
    assert_eq!(second.failed[0].0, boom);
    // ok.ts was not compiled again; boom.ts and gated.ts were.
    assert_eq!(orch.compiler().invocations(), 5);
    assert_eq!(orch.registry().len(), 2);
}

#[tokio::test]
async fn missing_default_export_is_skipped() {
    let ws = TestWorkspace::new();
    let named = ws.script("named.ts", "// @scriptor-register\nexport const value = 1;\n");
    let scalar = ws.script("scalar.ts", "export default 42;\n");
    let mut orch = orchestrator(&ws);

    let report = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert!(report.loaded.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.skipped_no_default, [named, scalar]);
    assert!(orch.registry().is_empty());
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let ws = TestWorkspace::new();
    ws.script("first.ts", &capability_script("same"));
    let second = ws.script("second.ts", &capability_script("same"));
    let mut orch = orchestrator(&ws);

    let report = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(report.loaded.len(), 1);
    assert_eq!(report.failed[0].0, second);
    assert!(report.failed[0].1.contains("same"));
}

#[tokio::test]
async fn manifest_declares_files_and_ids() {
    let ws = TestWorkspace::new();
    let plain = ws.script(
        "plain.ts",
        "const tool = { run(): number { return 7; } };\nexports.default = tool;\n",
    );
    ws.script("manifest.toml", "[[capability]]\nfile = \"plain.ts\"\nid = \"declared\"\n");
    let mut orch = orchestrator(&ws);

    let report = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(report.loaded, [plain.clone()]);
    let capability = orch.registry().get("declared").unwrap();
    assert_eq!(capability.source, plain);
    assert_eq!(capability.members, ["run"]);
}

#[tokio::test]
async fn entries_load_dependencies_and_can_be_invoked() {
    let ws = TestWorkspace::new();
    ws.package(
        &ws.scan_dir(),
        "left-pad",
        Some("lib/pad.js"),
        &[(
            "lib/pad.js",
            "module.exports = function (s, n) { while (s.length < n) s = ' ' + s; return s; };\n",
        )],
    );
    ws.script(
        "lib/greeting.ts",
        "export function greeting(name: string): string {\n  return `hello ${name}`;\n}\n",
    );
    let entry = ws.script(
        "greeter.ts",
        "// @scriptor-register\n\
         import pad from \"left-pad\";\n\
         import { greeting } from \"./lib/greeting\";\n\
         export default {\n\
           id: \"greeter\",\n\
           label: \"Greeter\",\n\
           greet(name: string): string {\n    return greeting(name);\n  },\n\
           async padded(text: string, width: number): Promise<string> {\n    return pad(text, width);\n  },\n\
         };\n",
    );
    let mut orch = orchestrator(&ws);

    let report = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(report.loaded, [entry.clone()], "{report:?}");

    let capability = orch.registry().get("greeter").unwrap();
    assert_eq!(capability.members, ["id", "label", "greet", "padded"]);
    assert_eq!(capability.descriptor, json!({ "id": "greeter", "label": "Greeter" }));

    let session = orch.session();
    assert_eq!(session.transpile_count(), 1);
    assert_eq!(session.invoke(&entry, "greet", "[\"bob\"]").unwrap(), json!("hello bob"));
    assert_eq!(session.invoke(&entry, "padded", "[\"ab\", 4]").unwrap(), json!("  ab"));
    assert!(session.invoke(&entry, "missing", "[]").is_err());
}

#[tokio::test]
async fn entry_already_loaded_as_a_dependency_is_not_compiled_again() {
    let ws = TestWorkspace::new();
    let a = ws.script(
        "a.ts",
        "// @scriptor-register\n\
         import b from \"./b\";\n\
         export default {\n  id: \"alpha\",\n  run(): string {\n    return b.run();\n  },\n};\n",
    );
    let b = ws.script("b.ts", &capability_script("beta"));
    let mut orch = orchestrator(&ws);

    let report = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(report.loaded, [a.clone(), b.clone()], "{report:?}");
    assert_eq!(orch.compiler().invocations(), 1);
    assert!(ws.scan_dir().join("out/a.js").is_file());
    assert!(!ws.scan_dir().join("out/b.js").exists());

    let ids: Vec<_> = orch.registry().list().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["alpha", "beta"]);
    assert_eq!(orch.session().invoke(&a, "run", "[]").unwrap(), json!("beta:ran"));
    assert_eq!(orch.session().execution_count(), 2);
}

#[tokio::test]
async fn legacy_class_decorators_run() {
    let ws = TestWorkspace::new();
    ws.script(
        "decorated.ts",
        "// @scriptor-register\n\
         function tag(label: string) {\n  return function (target: any) {\n    target.label = label;\n  };\n}\n\
         @tag(\"decorated\")\n\
         class Tool {\n  run(): string {\n    return (Tool as any).label;\n  }\n}\n\
         export default new Tool();\n",
    );
    let mut orch = orchestrator(&ws);

    let report = orch.scan_and_load(&ws.scan_dir()).await.unwrap();
    assert_eq!(report.loaded.len(), 1, "{report:?}");
    let capability = orch.registry().get("decorated").unwrap();
    assert_eq!(capability.members, ["run"]);
    let source = capability.source.clone();
    assert_eq!(orch.session().invoke(&source, "run", "[]").unwrap(), json!("decorated"));
}
