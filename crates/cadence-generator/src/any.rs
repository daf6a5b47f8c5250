//! A closed set of backends behind one concrete type.

use cadence_core::{
  GenerationError, TextGenerator,
  generate::{DisabledGenerator, Sampling, TemplateGenerator},
};

use crate::HttpGenerator;

pub enum AnyGenerator {
  Template(TemplateGenerator),
  Http(HttpGenerator),
  Disabled(DisabledGenerator),
}

impl AnyGenerator {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Template(_) => "template",
      Self::Http(_) => "http",
      Self::Disabled(_) => "disabled",
    }
  }
}

impl TextGenerator for AnyGenerator {
  async fn generate(
    &self,
    prompt: &str,
    sampling: Sampling,
  ) -> Result<String, GenerationError> {
    match self {
      Self::Template(g) => g.generate(prompt, sampling).await,
      Self::Http(g) => g.generate(prompt, sampling).await,
      Self::Disabled(g) => g.generate(prompt, sampling).await,
    }
  }

  async fn generate_variants(
    &self,
    prompt: &str,
    n: usize,
    temperature: f32,
  ) -> Result<Vec<String>, GenerationError> {
    match self {
      Self::Template(g) => g.generate_variants(prompt, n, temperature).await,
      Self::Http(g) => g.generate_variants(prompt, n, temperature).await,
      Self::Disabled(g) => g.generate_variants(prompt, n, temperature).await,
    }
  }
}
