//! Backend selection.

use serde::Deserialize;

use crate::{AnyGenerator, Error, HttpGenerator, Result};

/// Which text backend produces message wording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  /// Canned phrasings keyed by intent. Deterministic, needs nothing.
  #[default]
  Template,
  /// An OpenAI-compatible completions endpoint.
  Http,
  /// No backend; every message uses its role's fallback sentence.
  Disabled,
}

impl std::str::FromStr for Backend {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "template" => Ok(Self::Template),
      "http" => Ok(Self::Http),
      "disabled" => Ok(Self::Disabled),
      other => Err(Error::Config(format!(
        "unknown backend {other:?} (expected template, http or disabled)"
      ))),
    }
  }
}

/// Settings for [`HttpGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  /// Server root, e.g. `http://127.0.0.1:8080` for a local llama.cpp server.
  pub base_url:     String,
  pub model:        String,
  /// Sent as a bearer token when set.
  pub api_key:      Option<String>,
  pub timeout_secs: u64,
  pub stop:         Vec<String>,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      base_url:     "http://127.0.0.1:8080".into(),
      model:        "mistral-7b-instruct".into(),
      api_key:      None,
      timeout_secs: 30,
      stop:         vec!["\n\n".into()],
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
  pub backend: Backend,
  pub http:    HttpConfig,
}

impl GeneratorConfig {
  pub fn build(&self) -> Result<AnyGenerator> {
    Ok(match self.backend {
      Backend::Template => AnyGenerator::Template(Default::default()),
      Backend::Disabled => AnyGenerator::Disabled(Default::default()),
      Backend::Http => {
        if self.http.base_url.trim().is_empty() {
          return Err(Error::Config("http.base_url must be set".into()));
        }
        AnyGenerator::Http(HttpGenerator::new(self.http.clone())?)
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_to_template() {
    let config: GeneratorConfig = toml::from_str("").unwrap();
    assert_eq!(config.backend, Backend::Template);
    assert!(matches!(config.build().unwrap(), AnyGenerator::Template(_)));
  }

  #[test]
  fn http_section_is_read() {
    let config: GeneratorConfig = toml::from_str(
      r#"
      backend = "http"
      [http]
      base_url = "http://gpu-box:8000"
      model = "local"
      "#,
    )
    .unwrap();
    assert_eq!(config.backend, Backend::Http);
    assert_eq!(config.http.base_url, "http://gpu-box:8000");
    assert_eq!(config.http.timeout_secs, 30);
    assert!(matches!(config.build().unwrap(), AnyGenerator::Http(_)));
  }

  #[test]
  fn blank_base_url_is_rejected() {
    let config = GeneratorConfig {
      backend: Backend::Http,
      http:    HttpConfig { base_url: " ".into(), ..HttpConfig::default() },
    };
    assert!(matches!(config.build(), Err(Error::Config(_))));
  }

  #[test]
  fn backend_names_parse() {
    assert_eq!("disabled".parse::<Backend>().unwrap(), Backend::Disabled);
    assert!("gpt".parse::<Backend>().is_err());
  }
}
