//! Script sources for common test cases.

/// A capability script whose default export has `id` and a `run` method
/// returning `"<id>:ran"`.
#[must_use]
pub fn capability_script(id: &str) -> String {
    format!(
        "// @scriptor-register\n\
         export default {{\n  id: \"{id}\",\n  run(): string {{\n    return \"{id}:ran\";\n  }},\n}};\n"
    )
}

/// A script that carries the registration marker but fails to type-check
/// its imports.
#[must_use]
pub fn broken_script() -> String {
    "// @scriptor-register\nimport { missing } from \"./does-not-exist\";\nexport default { id: missing };\n"
        .to_owned()
}

/// A script that throws while its top level runs.
#[must_use]
pub fn throwing_script(message: &str) -> String {
    format!("// @scriptor-register\nthrow new Error(\"{message}\");\nexport default {{}};\n")
}

/// A script without any eligibility marker.
#[must_use]
pub fn unmarked_script() -> String {
    "export const helper = (n: number): number => n * 2;\n".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_carry_expected_markers() {
        assert!(capability_script("x").contains("@scriptor-register"));
        assert!(capability_script("x").contains("id: \"x\""));
        assert!(!unmarked_script().contains("export default"));
        assert!(!unmarked_script().contains("@scriptor-register"));
        assert!(throwing_script("boom").contains("boom"));
    }
}
