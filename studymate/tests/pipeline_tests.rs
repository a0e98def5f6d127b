//! End-to-end tests for extraction, retrieval, generation and the session flow.
//!
//! Models are replaced by a deterministic bag-of-words embedder and a scripted
//! language model so that every path runs without downloads.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use studymate::session::{BLANK_QUESTION_MESSAGE, NO_CONTENT_MESSAGE, READY_MESSAGE};
use studymate::{
    AnswerGenerator, AskOutcome, EmbeddingProvider, GenerationParams, GeneratorConfig,
    LanguageModel, ModelLoader, NO_DIRECT_ANSWER, NOT_PROCESSED, Passage, QaPipeline, Result,
    Session, StudyMateConfig, StudyMateError, UploadOutcome,
};

const PARIS: &str = "Paris is the capital of France and has a population of over two million.";
const EIFFEL: &str = "The Eiffel Tower was completed in 1889.";
const EIFFEL_LONG: &str = "The Eiffel Tower was completed in 1889 and stands on the Champ de Mars.";
const QUESTION: &str = "What is the capital of France?";

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Hashes lowercase words into a fixed number of buckets.
#[derive(Default)]
struct BagOfWordsEmbedder {
    calls: AtomicUsize,
}

impl EmbeddingProvider for BagOfWordsEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0; 64];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word.to_lowercase().bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3)
            });
            v[(hash % 64) as usize] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        64
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

struct BrokenEmbedder;

impl EmbeddingProvider for BrokenEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(StudyMateError::Embedding {
            provider: "broken".to_string(),
            message: "device lost".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        8
    }
}

/// Character-level model that answers with the first sentence of its context.
struct FirstSentenceModel {
    calls: Arc<AtomicUsize>,
}

impl LanguageModel for FirstSentenceModel {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn eos_token_id(&self) -> u32 {
        0
    }

    fn generate(&mut self, input_ids: &[u32], _params: &GenerationParams) -> Result<Vec<u32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = self.decode(input_ids)?;
        let context = prompt
            .split_once("CONTEXT:\n")
            .map(|(_, rest)| rest)
            .ok_or_else(|| StudyMateError::Generation("prompt has no context".to_string()))?;
        let sentence = match context.find('.') {
            Some(end) => &context[..=end],
            None => context,
        };
        self.tokenize(sentence)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(ids.iter().filter(|id| **id != 0).filter_map(|id| char::from_u32(*id)).collect())
    }
}

#[derive(Default)]
struct FirstSentenceLoader {
    loads: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl ModelLoader for FirstSentenceLoader {
    fn load(&self) -> Result<Box<dyn LanguageModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FirstSentenceModel { calls: Arc::clone(&self.calls) }))
    }

    fn model_id(&self) -> &str {
        "first-sentence"
    }
}

struct Harness {
    pipeline: QaPipeline,
    embedder: Arc<BagOfWordsEmbedder>,
    loads: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

fn harness() -> Harness {
    let loader = FirstSentenceLoader::default();
    let loads = Arc::clone(&loader.loads);
    let calls = Arc::clone(&loader.calls);
    let generator = AnswerGenerator::new(Box::new(loader), GeneratorConfig::default()).unwrap();
    let embedder = Arc::new(BagOfWordsEmbedder::default());

    let pipeline = QaPipeline::builder()
        .config(StudyMateConfig::default())
        .embedding_provider(embedder.clone())
        .generator(Arc::new(generator))
        .build()
        .unwrap();

    Harness { pipeline, embedder, loads, calls }
}

/// A PDF with one page per entry, each page holding one line of text.
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let blocks: Vec<Vec<&str>> =
        pages.iter().map(|text| if text.is_empty() { vec![] } else { vec![*text] }).collect();
    let blocks: Vec<&[&str]> = blocks.iter().map(Vec::as_slice).collect();
    pdf_with_blocks(&blocks)
}

/// A PDF with one page per entry; each page stacks its text blocks from the
/// top, separated by a wide vertical gap.
fn pdf_with_blocks(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for blocks in pages {
        let mut operations = Vec::new();
        for (i, text) in blocks.iter().enumerate() {
            let y = 720 - 240 * i as i64;
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]);
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[test]
fn answers_capital_question_from_best_passage() {
    let h = harness();
    let passages = vec![Passage::from(PARIS), Passage::from(EIFFEL)];
    let index = h.pipeline.build_index(passages.clone()).unwrap();

    let answer = h.pipeline.answer_question(QUESTION, &passages, index.as_ref(), 1).unwrap();

    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].passage.text(), PARIS);
    assert_eq!(answer.sources[0].position, 0);
    assert_ne!(answer.text, NO_DIRECT_ANSWER);
    assert!(answer.text.contains("Paris"));
    assert_eq!(h.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn top_k_larger_than_document_returns_every_passage() {
    let h = harness();
    let passages = vec![Passage::from(PARIS), Passage::from(EIFFEL)];
    let index = h.pipeline.build_index(passages.clone()).unwrap();

    let answer = h.pipeline.answer_question(QUESTION, &passages, index.as_ref(), 10).unwrap();
    let sources: Vec<&str> = answer.source_passages().map(Passage::text).collect();
    assert_eq!(sources, vec![PARIS, EIFFEL]);
}

#[test]
fn zero_top_k_skips_the_model() {
    let h = harness();
    let passages = vec![Passage::from(PARIS)];
    let index = h.pipeline.build_index(passages.clone()).unwrap();

    let answer = h.pipeline.answer_question(QUESTION, &passages, index.as_ref(), 0).unwrap();
    assert_eq!(answer.text, studymate::NO_RELEVANT_INFORMATION);
    assert!(answer.sources.is_empty());
    assert_eq!(h.loads.load(Ordering::SeqCst), 0);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn model_is_loaded_once_across_questions() {
    let h = harness();
    let passages = vec![Passage::from(PARIS), Passage::from(EIFFEL)];
    let index = h.pipeline.build_index(passages.clone()).unwrap();

    for _ in 0..3 {
        h.pipeline.ask(QUESTION, &passages, index.as_ref()).unwrap();
    }
    assert_eq!(h.loads.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.load(Ordering::SeqCst), 3);
    assert!(h.pipeline.generator().is_loaded());
}

#[test]
fn extracts_one_passage_per_page() {
    let h = harness();
    let bytes = pdf_with_pages(&[PARIS, "Page 2", EIFFEL_LONG]);

    let passages = h.pipeline.extract_bytes(&bytes);
    assert_eq!(passages.len(), 2);
    assert!(passages[0].contains("capital of France"));
    assert!(passages[1].contains("Champ de Mars"));
}

#[test]
fn separate_text_blocks_on_one_page_become_separate_passages() {
    let h = harness();
    let bytes = pdf_with_blocks(&[&[PARIS, EIFFEL_LONG]]);

    let passages = h.pipeline.extract_bytes(&bytes);
    assert_eq!(passages.len(), 2, "got {passages:?}");
    assert!(passages[0].contains("capital of France"));
    assert!(!passages[0].contains("Eiffel"));
    assert!(passages[1].contains("Champ de Mars"));
}

#[test]
fn extracts_from_file_on_disk() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, pdf_with_pages(&[PARIS])).unwrap();

    let passages = h.pipeline.extract_path(&path);
    assert_eq!(passages.len(), 1);
    assert!(passages[0].starts_with("Paris is the capital"));
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[test]
fn session_upload_then_ask() {
    let h = harness();
    let mut session = Session::new(h.pipeline.clone());
    let bytes = pdf_with_pages(&[PARIS, EIFFEL_LONG]);

    let outcome = session.upload("geography.pdf", &bytes);
    assert_eq!(outcome, UploadOutcome::Ready { passage_count: 2 });
    assert_eq!(outcome.message(), READY_MESSAGE);
    assert!(session.is_ready());

    let indexed = session.index().unwrap().passages();
    assert_eq!(session.passages().len(), 2);
    assert!(std::ptr::eq(session.passages().as_ptr(), indexed.as_ptr()));

    match session.ask(QUESTION) {
        AskOutcome::Answered(answer) => {
            assert_eq!(answer.sources[0].position, 0);
            assert!(answer.text.contains("Paris"));
        }
        other => panic!("expected an answer, got {other:?}"),
    }
}

#[test]
fn reuploading_same_document_is_a_no_op() {
    let h = harness();
    let mut session = Session::new(h.pipeline.clone());
    let bytes = pdf_with_pages(&[PARIS]);

    assert!(matches!(session.upload("a.pdf", &bytes), UploadOutcome::Ready { .. }));
    let embeds = h.embedder.calls.load(Ordering::SeqCst);

    assert_eq!(session.upload("a.pdf", &bytes), UploadOutcome::Unchanged);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), embeds);
    assert_eq!(session.loaded_name(), Some("a.pdf"));
}

#[test]
fn blank_pdf_reports_no_content() {
    let h = harness();
    let mut session = Session::new(h.pipeline.clone());

    let outcome = session.upload("blank.pdf", &pdf_with_pages(&[""]));
    assert_eq!(outcome, UploadOutcome::NoContent);
    assert_eq!(outcome.message(), NO_CONTENT_MESSAGE);
    assert!(session.index().is_none());
    assert!(session.passages().is_empty());

    match session.ask(QUESTION) {
        AskOutcome::Answered(answer) => {
            assert_eq!(answer.text, NOT_PROCESSED);
            assert!(answer.sources.is_empty());
        }
        other => panic!("expected the not-processed answer, got {other:?}"),
    }
    assert_eq!(h.loads.load(Ordering::SeqCst), 0);
}

#[test]
fn unreadable_upload_clears_previous_document() {
    let h = harness();
    let mut session = Session::new(h.pipeline.clone());
    assert!(session.upload("a.pdf", &pdf_with_pages(&[PARIS])).is_ready());

    assert_eq!(session.upload("b.pdf", b"not a pdf at all"), UploadOutcome::NoContent);
    assert!(!session.is_ready());
    assert_eq!(session.loaded_name(), None);
}

#[test]
fn blank_question_never_reaches_the_pipeline() {
    let h = harness();
    let mut session = Session::new(h.pipeline.clone());
    session.upload("a.pdf", &pdf_with_pages(&[PARIS]));
    let embeds = h.embedder.calls.load(Ordering::SeqCst);

    assert_eq!(session.ask("   \t "), AskOutcome::Warning(BLANK_QUESTION_MESSAGE.to_string()));
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), embeds);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn indexing_failure_is_reported() {
    let loader = FirstSentenceLoader::default();
    let pipeline = QaPipeline::builder()
        .config(StudyMateConfig::default())
        .embedding_provider(Arc::new(BrokenEmbedder))
        .generator(Arc::new(
            AnswerGenerator::new(Box::new(loader), GeneratorConfig::default()).unwrap(),
        ))
        .build()
        .unwrap();
    let mut session = Session::new(pipeline);

    let outcome = session.upload("a.pdf", &pdf_with_pages(&[PARIS]));
    assert!(matches!(outcome, UploadOutcome::Failed(_)));
    assert!(outcome.message().starts_with("An error occurred during processing: Index error"));
    assert!(!session.is_ready());
}

#[test]
fn upload_path_and_reset() {
    let h = harness();
    let mut session = Session::new(h.pipeline.clone());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, pdf_with_pages(&[PARIS])).unwrap();

    assert_eq!(session.upload_path(&path), UploadOutcome::Ready { passage_count: 1 });
    assert_eq!(session.upload_path(&path), UploadOutcome::Unchanged);

    session.reset();
    assert!(!session.is_ready());
    assert!(session.passages().is_empty());
}

#[cfg(feature = "candle")]
#[test]
#[ignore = "downloads the embedding and answer models"]
fn answers_with_pretrained_models() {
    let pipeline = QaPipeline::from_config(StudyMateConfig::default()).unwrap();
    let passages = vec![Passage::from(PARIS), Passage::from(EIFFEL)];
    let index = pipeline.build_index(passages.clone()).unwrap();

    let answer = pipeline.answer_question(QUESTION, &passages, index.as_ref(), 1).unwrap();
    assert_eq!(answer.sources[0].passage.text(), PARIS);
    assert_ne!(answer.text, NO_DIRECT_ANSWER);
}
