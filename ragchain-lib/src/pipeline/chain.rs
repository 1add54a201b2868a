use crate::error::PipelineError;
use crate::index::Document;

/// A single-input, single-output step of a retrieval chain.
///
/// Any `Fn(In) -> Result<Out, PipelineError>` is a stage, so a chat model
/// client or output parser plugs in as a closure. The first failing stage
/// short-circuits the chain.
pub trait Stage<In> {
    type Out;

    fn run(&self, input: In) -> Result<Self::Out, PipelineError>;

    /// Feed this stage's output into `next`.
    fn then<S>(self, next: S) -> Then<Self, S>
    where
        Self: Sized,
        S: Stage<Self::Out>,
    {
        Then {
            first: self,
            second: next,
        }
    }
}

impl<In, Out, F> Stage<In> for F
where
    F: Fn(In) -> Result<Out, PipelineError>,
{
    type Out = Out;

    fn run(&self, input: In) -> Result<Out, PipelineError> {
        self(input)
    }
}

/// Two stages run in sequence. Built by [`Stage::then`].
#[derive(Debug, Clone)]
pub struct Then<A, B> {
    first: A,
    second: B,
}

impl<In, A, B> Stage<In> for Then<A, B>
where
    A: Stage<In>,
    B: Stage<A::Out>,
{
    type Out = B::Out;

    fn run(&self, input: In) -> Result<Self::Out, PipelineError> {
        let intermediate = self.first.run(input)?;
        self.second.run(intermediate)
    }
}

/// Retrieved documents together with the question that retrieved them
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub question: String,
    pub documents: Vec<Document>,
}

/// Runs a document stage and passes the question through next to its output.
#[derive(Debug, Clone)]
pub struct WithQuestion<R> {
    inner: R,
}

impl<R> WithQuestion<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R> Stage<String> for WithQuestion<R>
where
    R: Stage<String, Out = Vec<Document>>,
{
    type Out = RetrievedContext;

    fn run(&self, question: String) -> Result<RetrievedContext, PipelineError> {
        let documents = self.inner.run(question.clone())?;
        Ok(RetrievedContext {
            question,
            documents,
        })
    }
}

const DEFAULT_TEMPLATE: &str = "Answer the question based only on the following context.
Answer in as few words as possible.
{context}
Question: {question}
";

/// Renders retrieved documents and the question into a chat prompt.
///
/// `{context}` is replaced by the document texts joined with the separator,
/// `{question}` by the question. Substituted text is never re-scanned for
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    separator: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            separator: "\n\n".to_string(),
        }
    }

    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn format(&self, context: &RetrievedContext) -> String {
        let documents = format_documents(&context.documents, &self.separator);
        render(
            &self.template,
            &[
                ("{context}", documents.as_str()),
                ("{question}", context.question.as_str()),
            ],
        )
    }
}

impl Stage<RetrievedContext> for PromptTemplate {
    type Out = String;

    fn run(&self, context: RetrievedContext) -> Result<String, PipelineError> {
        Ok(self.format(&context))
    }
}

/// Join document texts in rank order.
pub fn format_documents(documents: &[Document], separator: &str) -> String {
    documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        match vars.iter().find(|(placeholder, _)| rest.starts_with(placeholder)) {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &rest[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Metadata;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(id: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
            vector: vec![1.0],
        }
    }

    #[test]
    fn test_closures_chain() {
        let double = |x: i32| -> Result<i32, PipelineError> { Ok(x * 2) };
        let describe = |x: i32| -> Result<String, PipelineError> { Ok(format!("got {x}")) };

        let chain = double.then(double).then(describe);
        assert_eq!(chain.run(5).unwrap(), "got 20");
    }

    #[test]
    fn test_failure_short_circuits() {
        let calls = AtomicUsize::new(0);
        let fail = |_: i32| -> Result<i32, PipelineError> { Err(PipelineError::stage("model", "quota exceeded")) };
        let count = |x: i32| -> Result<i32, PipelineError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(x)
        };

        let err = fail.then(&count).run(1).unwrap_err();
        assert!(matches!(err, PipelineError::Stage { ref stage, .. } if stage == "model"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_with_question_passes_query_through() {
        let lookup = |q: String| -> Result<Vec<Document>, PipelineError> { Ok(vec![doc("1", &q.to_uppercase())]) };

        let context = WithQuestion::new(lookup).run("where?".to_string()).unwrap();
        assert_eq!(context.question, "where?");
        assert_eq!(context.documents, vec![doc("1", "WHERE?")]);
    }

    #[test]
    fn test_default_template() {
        let context = RetrievedContext {
            question: "What city did I visit last?".to_string(),
            documents: vec![doc("a", "In 2023, I visited Paris"), doc("b", "In 2022, I visited New York")],
        };

        let prompt = PromptTemplate::default().format(&context);
        assert_eq!(
            prompt,
            "Answer the question based only on the following context.\n\
             Answer in as few words as possible.\n\
             In 2023, I visited Paris\n\nIn 2022, I visited New York\n\
             Question: What city did I visit last?\n"
        );
    }

    #[test]
    fn test_substitutions_are_not_rescanned() {
        let template = PromptTemplate::new("{context} | {question} | {other}").with_separator(", ");
        let context = RetrievedContext {
            question: "about {context}?".to_string(),
            documents: vec![doc("a", "x {question}"), doc("b", "y")],
        };

        assert_eq!(
            template.format(&context),
            "x {question}, y | about {context}? | {other}"
        );
    }

    #[test]
    fn test_format_documents_empty() {
        assert_eq!(format_documents(&[], "\n"), "");
    }
}
