//! Host-bridge manifest.
//!
//! The fixed allow-list of specifiers that never touch the filesystem. Adding
//! a host binding means adding it here and teaching the sandbox to build it.

/// Specifier of the privileged host API object.
pub const HOST_API_MODULE: &str = "scriptor";

/// Platform primitives served from the host's own implementations.
pub const PLATFORM_MODULES: &[&str] = &["fs", "path", "process", "os", "timers", "console"];

/// Prefix the compiler uses when it imports runtime helpers.
pub const HELPER_PREFIX: &str = "@oxc-project/runtime/helpers/";

/// Helper names the embedded shim provides.
pub const HELPER_NAMES: &[&str] = &["decorate", "decorateParam", "decorateMetadata", "defineProperty"];

/// A specifier satisfied by the host rather than by a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostModule {
    /// The privileged host API singleton.
    Api,
    /// A platform primitive, by canonical name (`fs`, `path`, ...).
    Platform(&'static str),
    /// A compiler runtime helper, by name.
    Helper(String),
}

/// Classify `specifier` against the allow-list.
#[must_use]
pub fn host_module(specifier: &str) -> Option<HostModule> {
    if specifier == HOST_API_MODULE {
        return Some(HostModule::Api);
    }
    if let Some(name) = specifier.strip_prefix(HELPER_PREFIX) {
        let name = name.strip_suffix(".js").unwrap_or(name);
        return Some(HostModule::Helper(name.to_owned()));
    }
    let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
    PLATFORM_MODULES
        .iter()
        .copied()
        .find(|m| *m == bare)
        .map(HostModule::Platform)
}

/// Evaluates to an object mapping helper name to a module-shaped object
/// (`{ __esModule: true, default: fn }`).
pub(crate) const HELPERS_JS: &str = r#"(function () {
  "use strict";
  function decorate(decorators, target, key, desc) {
    var c = arguments.length;
    var r = c < 3 ? target : desc === null ? (desc = Object.getOwnPropertyDescriptor(target, key)) : desc;
    if (typeof Reflect === "object" && typeof Reflect.decorate === "function") {
      r = Reflect.decorate(decorators, target, key, desc);
    } else {
      for (var i = decorators.length - 1; i >= 0; i--) {
        var d = decorators[i];
        if (d) r = (c < 3 ? d(r) : c > 3 ? d(target, key, r) : d(target, key)) || r;
      }
    }
    if (c > 3 && r) Object.defineProperty(target, key, r);
    return r;
  }
  function decorateParam(index, decorator) {
    return function (target, key) { decorator(target, key, index); };
  }
  function decorateMetadata(k, v) {
    if (typeof Reflect === "object" && typeof Reflect.metadata === "function") {
      return Reflect.metadata(k, v);
    }
    return function () {};
  }
  function defineProperty(obj, key, value) {
    if (key in obj) {
      Object.defineProperty(obj, key, { value: value, enumerable: true, configurable: true, writable: true });
    } else {
      obj[key] = value;
    }
    return obj;
  }
  var table = { decorate: decorate, decorateParam: decorateParam, decorateMetadata: decorateMetadata, defineProperty: defineProperty };
  var out = {};
  Object.keys(table).forEach(function (name) {
    out[name] = Object.freeze({ __esModule: true, default: table[name] });
  });
  return out;
})()"#;
