//! OXC-based TypeScript transpilation and ESM → CommonJS lowering.
//!
//! Pipeline per file:
//! 1. Parse with OXC (TS or JS by extension)
//! 2. Record value imports and re-exports for the compiler host
//! 3. Semantic analysis, then the transformer (types stripped, decorators lowered)
//! 4. Codegen
//! 5. Lowering of top-level `import`/`export` to `require`/`exports`, located
//!    by re-parsing the printed module

use std::path::Path;

use oxc::ast::ast::{
    Declaration, ExportAllDeclaration, ExportDefaultDeclarationKind, ExportNamedDeclaration,
    ImportDeclaration, ImportDeclarationSpecifier, Program, Statement,
};
use oxc::codegen::Codegen;
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::{GetSpan, SourceType, Span};
use oxc::transformer::{TransformOptions, Transformer};

use crate::compiler::{CompilerOptions, Diagnostic};
use crate::error::{LoaderError, LoaderResult};

/// First line of every lowered ES module.
const ESM_MARKER: &str = "Object.defineProperty(exports, \"__esModule\", { value: true });";

/// Default-import interop: a CommonJS module's `module.exports` is its default.
const INTEROP_DEFAULT: &str = "(function (m) { return m && m.__esModule ? m.default : m; })";

/// An import or re-export that must resolve at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportRef {
    pub(crate) specifier: String,
    /// Byte offset of the specifier literal.
    pub(crate) offset: u32,
}

/// Output of [`transform`]. `code` is empty when `errors` is not.
#[derive(Debug, Default)]
pub(crate) struct Transformed {
    pub(crate) code: String,
    pub(crate) imports: Vec<ImportRef>,
    pub(crate) errors: Vec<Diagnostic>,
}

/// Build OXC transform options from compiler settings.
pub(crate) fn transform_options(options: &CompilerOptions) -> Result<TransformOptions, String> {
    let mut transform = TransformOptions::from_target(&options.target)
        .map_err(|e| format!("invalid target '{}': {e}", options.target))?;
    transform.decorator.legacy = options.experimental_decorators;
    transform.decorator.emit_decorator_metadata = options.emit_decorator_metadata;
    Ok(transform)
}

/// Parse, strip types and print one file. Does not lower ESM syntax.
pub(crate) fn transform(source: &str, path: &Path, options: &TransformOptions) -> Transformed {
    let allocator = oxc_allocator::Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return Transformed {
            errors: parsed
                .errors
                .iter()
                .map(|e| Diagnostic::from_oxc(path, source, e))
                .collect(),
            ..Transformed::default()
        };
    }

    let mut program = parsed.program;
    let imports = collect_imports(&program);

    let scoping = SemanticBuilder::new()
        .with_excess_capacity(2.0)
        .build(&program)
        .semantic
        .into_scoping();

    let transformed = Transformer::new(&allocator, path, options).build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Transformed {
            imports,
            errors: transformed
                .errors
                .iter()
                .map(|e| Diagnostic::from_oxc(path, source, e))
                .collect(),
            ..Transformed::default()
        };
    }

    Transformed {
        code: Codegen::new().build(&program).code,
        imports,
        errors: Vec::new(),
    }
}

/// Single-file transpile used for dependencies: no cross-file checks.
///
/// # Errors
///
/// Returns [`LoaderError::Transpile`] if the target is invalid or the file
/// fails to parse or transform.
pub fn transpile(source: &str, path: &Path, options: &CompilerOptions) -> LoaderResult<String> {
    let transform_opts = transform_options(options).map_err(|message| LoaderError::Transpile {
        path: path.to_path_buf(),
        message,
    })?;

    let out = transform(source, path, &transform_opts);
    if !out.errors.is_empty() {
        let message = out
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        return Err(LoaderError::Transpile {
            path: path.to_path_buf(),
            message,
        });
    }
    Ok(lower_esm(&out.code))
}

/// Value imports and re-exports, skipping `import type` / `export type`.
fn collect_imports(program: &Program<'_>) -> Vec<ImportRef> {
    let mut imports = Vec::new();
    for stmt in &program.body {
        let source = match stmt {
            Statement::ImportDeclaration(decl) if !decl.import_kind.is_type() => Some(&decl.source),
            Statement::ExportNamedDeclaration(decl) if !decl.export_kind.is_type() => {
                decl.source.as_ref()
            },
            Statement::ExportAllDeclaration(decl) if !decl.export_kind.is_type() => Some(&decl.source),
            _ => None,
        };
        if let Some(lit) = source {
            imports.push(ImportRef {
                specifier: lit.value.as_str().to_owned(),
                offset: lit.span.start,
            });
        }
    }
    imports
}

/// Lower top-level `import`/`export` statements to `require`/`exports`.
///
/// Statements are located by parsing `js`, so text inside strings, templates
/// and comments is never rewritten. Named exports become getters on
/// `exports`, defined before the body runs so a cyclic `require` already
/// sees them. Input that does not parse as a module is returned unchanged.
pub(crate) fn lower_esm(js: &str) -> String {
    let allocator = oxc_allocator::Allocator::default();
    let parsed = Parser::new(&allocator, js, SourceType::mjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return js.to_owned();
    }

    let mut lowerer = Lowerer {
        source: js,
        temps: 0,
        bindings: Vec::new(),
    };
    let edits: Vec<(Span, String)> = parsed
        .program
        .body
        .iter()
        .filter_map(|stmt| lowerer.statement(stmt).map(|code| (stmt.span(), code)))
        .collect();
    if edits.is_empty() {
        return js.to_owned();
    }

    let mut out = String::with_capacity(js.len().saturating_add(ESM_MARKER.len()));
    out.push_str(ESM_MARKER);
    for (exported, expr) in &lowerer.bindings {
        out.push('\n');
        out.push_str(&format!(
            "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {expr}; }} }});",
            js_string(exported)
        ));
    }
    out.push('\n');

    let mut cursor = 0_usize;
    for (span, code) in edits {
        out.push_str(js.get(cursor..span.start as usize).unwrap_or_default());
        out.push_str(&code);
        cursor = span.end as usize;
    }
    out.push_str(js.get(cursor..).unwrap_or_default());
    out
}

/// Rewrites one module statement at a time and collects the export getters.
struct Lowerer<'s> {
    source: &'s str,
    temps: usize,
    /// `(exported name, expression)` pairs exposed as live getters.
    bindings: Vec<(String, String)>,
}

impl<'s> Lowerer<'s> {
    fn text(&self, span: Span) -> &'s str {
        span.source_text(self.source)
    }

    fn temp(&mut self, kind: &str) -> String {
        let name = format!("__scriptor_{kind}_{}", self.temps);
        self.temps = self.temps.saturating_add(1);
        name
    }

    fn bind(&mut self, exported: &str, expr: impl Into<String>) {
        self.bindings.push((exported.to_owned(), expr.into()));
    }

    /// Replacement text for a module statement, `None` for anything else.
    fn statement(&mut self, stmt: &Statement<'_>) -> Option<String> {
        let code = match stmt {
            Statement::ImportDeclaration(decl) if decl.import_kind.is_type() => String::new(),
            Statement::ImportDeclaration(decl) => self.import(decl),
            Statement::ExportNamedDeclaration(decl) if decl.export_kind.is_type() => String::new(),
            Statement::ExportNamedDeclaration(decl) => self.export_named(decl),
            Statement::ExportDefaultDeclaration(decl) => self.export_default(&decl.declaration),
            Statement::ExportAllDeclaration(decl) if decl.export_kind.is_type() => String::new(),
            Statement::ExportAllDeclaration(decl) => self.export_all(decl),
            _ => return None,
        };
        Some(code)
    }

    fn import(&mut self, decl: &ImportDeclaration<'_>) -> String {
        let require = require_call(decl.source.value.as_str());
        let mut default = None;
        let mut namespace = None;
        let mut named = Vec::new();
        for specifier in decl.specifiers.iter().flatten() {
            match specifier {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => default = Some(s.local.name.as_str()),
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    namespace = Some(s.local.name.as_str().to_owned());
                },
                ImportDeclarationSpecifier::ImportSpecifier(s) if !s.import_kind.is_type() => {
                    let imported = s.imported.name();
                    let local = s.local.name.as_str();
                    named.push(if imported.as_str() == local {
                        local.to_owned()
                    } else {
                        format!("{}: {local}", property_key(imported.as_str()))
                    });
                },
                ImportDeclarationSpecifier::ImportSpecifier(_) => {},
            }
        }

        let target = namespace.or_else(|| (!named.is_empty()).then(|| format!("{{ {} }}", named.join(", "))));
        match (default, target) {
            (None, None) => format!("{require};"),
            (Some(d), None) => format!("const {d} = {INTEROP_DEFAULT}({require});"),
            (None, Some(t)) => format!("const {t} = {require};"),
            (Some(d), Some(t)) => {
                let temp = self.temp("import");
                format!("const {temp} = {require}; const {d} = {INTEROP_DEFAULT}({temp}); const {t} = {temp};")
            },
        }
    }

    fn export_named(&mut self, decl: &ExportNamedDeclaration<'_>) -> String {
        if let Some(declaration) = &decl.declaration {
            return self.declaration(declaration);
        }

        let (code, from) = match &decl.source {
            Some(source) => {
                let temp = self.temp("reexport");
                let code = format!("const {temp} = {};", require_call(source.value.as_str()));
                (code, Some(temp))
            },
            None => (String::new(), None),
        };
        for spec in decl.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
            let local = spec.local.name();
            let expr = match &from {
                Some(temp) => member(temp, local.as_str()),
                None => local.as_str().to_owned(),
            };
            self.bind(spec.exported.name().as_str(), expr);
        }
        code
    }

    fn declaration(&mut self, declaration: &Declaration<'_>) -> String {
        match declaration {
            Declaration::VariableDeclaration(var) => {
                for declarator in &var.declarations {
                    for id in declarator.id.get_binding_identifiers() {
                        self.bind(id.name.as_str(), id.name.as_str());
                    }
                }
                let text = self.text(var.span);
                if text.trim_end().ends_with(';') {
                    text.to_owned()
                } else {
                    format!("{text};")
                }
            },
            Declaration::FunctionDeclaration(_) | Declaration::ClassDeclaration(_) => {
                if let Some(id) = declaration.id() {
                    self.bind(id.name.as_str(), id.name.as_str());
                }
                self.text(declaration.span()).to_owned()
            },
            // Type-level declarations have no runtime value.
            _ => String::new(),
        }
    }

    fn export_default(&mut self, kind: &ExportDefaultDeclarationKind<'_>) -> String {
        let id = match kind {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => func.id.as_ref(),
            ExportDefaultDeclarationKind::ClassDeclaration(class) => class.id.as_ref(),
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => return String::new(),
            _ => None,
        };
        let text = self.text(kind.span());
        match id {
            // Named declarations keep their local binding.
            Some(id) => {
                self.bind("default", id.name.as_str());
                text.to_owned()
            },
            None => format!("exports.default = {text};"),
        }
    }

    fn export_all(&mut self, decl: &ExportAllDeclaration<'_>) -> String {
        let require = require_call(decl.source.value.as_str());
        match &decl.exported {
            Some(exported) => {
                let temp = self.temp("reexport");
                self.bind(exported.name().as_str(), temp.clone());
                format!("const {temp} = {require};")
            },
            None => format!(
                "(function (m) {{ Object.keys(m).forEach(function (k) {{ if (k !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, k)) Object.defineProperty(exports, k, {{ enumerable: true, get: function () {{ return m[k]; }} }}); }}); }})({require});"
            ),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// A JS string literal for `value`.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

fn require_call(module: &str) -> String {
    format!("require({})", js_string(module))
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_owned()
    } else {
        js_string(name)
    }
}

fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", js_string(name))
    }
}
