// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::{GeneratedText, LLMResult};
use std::rc::Rc;
use std::sync::Arc;

/// Synchronous request/response text generation.
///
/// Every call blocks until the model has answered; callers never
/// fire-and-forget and there is no cancellation.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText>;

    fn name(&self) -> &str {
        "text-generator"
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText> {
        (**self).generate(prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText> {
        (**self).generate(prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Rc<T> {
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText> {
        (**self).generate(prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText> {
        (**self).generate(prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Adapts a closure into a generator.
pub struct FnGenerator<F> {
    name: String,
    func: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(&str) -> LLMResult<GeneratedText>,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> TextGenerator for FnGenerator<F>
where
    F: Fn(&str) -> LLMResult<GeneratedText>,
{
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText> {
        (self.func)(prompt)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LLMError;
    use std::cell::Cell;

    #[test]
    fn closure_generator_echoes_prompt() {
        let generator = FnGenerator::new("echo", |prompt: &str| {
            Ok(GeneratedText::new(format!("echo: {prompt}")))
        });
        let reply = generator.generate("hello").unwrap();
        assert_eq!(reply.text, "echo: hello");
        assert_eq!(generator.name(), "echo");
    }

    #[test]
    fn boxed_and_borrowed_generators_delegate() {
        let calls = Cell::new(0);
        let generator = FnGenerator::new("counting", |_: &str| {
            calls.set(calls.get() + 1);
            Err(LLMError::Timeout)
        });
        let borrowed: &dyn TextGenerator = &generator;
        assert!(borrowed.generate("a").is_err());
        let boxed: Box<&dyn TextGenerator> = Box::new(borrowed);
        assert!(boxed.generate("b").is_err());
        assert_eq!(calls.get(), 2);
    }
}
