use tracing::{debug, info};

use crate::error::PipelineError;
use crate::layout::LayoutDocument;
use crate::providers::Provider;

/// Replaces every paragraph text of a layout with its translation.
///
/// All texts are sent as one ordered list, or in page-bounded chunks when the
/// provider caps the request size, and scattered back by position.
#[derive(Debug, Clone)]
pub struct Translator<P: Provider> {
    provider: P,
}

/// A contiguous run of the flattened paragraph list sent in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Chunk {
    start: usize,
    len: usize,
}

impl<P: Provider> Translator<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn translate(&self, doc: LayoutDocument) -> Result<LayoutDocument, PipelineError> {
        let page_sizes: Vec<usize> = doc
            .pages()
            .iter()
            .map(|page| page.paragraphs().len())
            .collect();
        let texts: Vec<String> = doc
            .pages()
            .iter()
            .flat_map(|page| page.paragraphs().iter())
            .map(|paragraph| paragraph.text().to_string())
            .collect();
        if texts.is_empty() {
            return Ok(doc);
        }

        let chunks = plan_chunks(&page_sizes, self.provider.batch_limit());
        info!(
            "translating {} paragraphs with {} in {} request(s)",
            texts.len(),
            self.provider.name(),
            chunks.len()
        );

        let mut translated = Vec::with_capacity(texts.len());
        for chunk in chunks {
            let request = texts[chunk.start..chunk.start + chunk.len].to_vec();
            debug!("request covers paragraphs {}..{}", chunk.start, chunk.start + chunk.len);
            let response = self.provider.translate(request).await.map_err(|err| {
                PipelineError::TranslationProviderError {
                    provider: self.provider.name().to_string(),
                    message: format!("{err:#}"),
                }
            })?;
            if response.len() != chunk.len {
                return Err(PipelineError::MismatchedBatchLength {
                    expected: chunk.len,
                    actual: response.len(),
                });
            }
            translated.extend(response);
        }

        let mut remaining = translated.into_iter();
        let page_texts = page_sizes
            .iter()
            .map(|size| remaining.by_ref().take(*size).collect())
            .collect();
        doc.with_page_texts(page_texts)
    }
}

/// Packs whole pages into chunks of at most `limit` texts.
///
/// A page larger than the limit is split on its own; no chunk mixes a split
/// page with another page.
fn plan_chunks(page_sizes: &[usize], limit: Option<usize>) -> Vec<Chunk> {
    let total: usize = page_sizes.iter().sum();
    let Some(limit) = limit.filter(|limit| *limit > 0 && *limit < total) else {
        return if total == 0 {
            Vec::new()
        } else {
            vec![Chunk { start: 0, len: total }]
        };
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut pending = 0usize;
    for &size in page_sizes {
        if size == 0 {
            continue;
        }
        if pending + size <= limit {
            pending += size;
            continue;
        }
        if pending > 0 {
            chunks.push(Chunk { start, len: pending });
            start += pending;
            pending = 0;
        }
        if size <= limit {
            pending = size;
            continue;
        }
        let mut rest = size;
        while rest > limit {
            chunks.push(Chunk { start, len: limit });
            start += limit;
            rest -= limit;
        }
        chunks.push(Chunk { start, len: rest });
        start += rest;
    }
    if pending > 0 {
        chunks.push(Chunk { start, len: pending });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{BBox, Page, ParagraphBlock, PointSize, RasterSize, RegionLabel};
    use crate::providers::ProviderFuture;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProvider {
        limit: Option<usize>,
        drop_last: bool,
        fail: bool,
        requests: Mutex<Vec<usize>>,
    }

    impl Provider for FakeProvider {
        fn name(&self) -> &'static str {
            "Fake"
        }

        fn batch_limit(&self) -> Option<usize> {
            self.limit
        }

        fn translate(&self, texts: Vec<String>) -> ProviderFuture<'_> {
            self.requests.lock().unwrap().push(texts.len());
            Box::pin(async move {
                if self.fail {
                    return Err(anyhow!("Quota Exceeded"));
                }
                let mut out: Vec<String> = texts.iter().map(|text| text.to_uppercase()).collect();
                if self.drop_last {
                    out.pop();
                }
                Ok(out)
            })
        }
    }

    fn doc(counts: &[usize]) -> LayoutDocument {
        let pages = counts
            .iter()
            .enumerate()
            .map(|(page, count)| {
                let paragraphs = (0..*count)
                    .map(|idx| {
                        let y = idx as f32 * 40.0;
                        ParagraphBlock::new(
                            BBox::new(0.0, y, 100.0, y + 30.0),
                            RegionLabel::Text,
                            format!("p{page}-{idx}"),
                            0.9,
                        )
                    })
                    .collect();
                Page::new(
                    page,
                    RasterSize {
                        width: 100,
                        height: 1000,
                    },
                    PointSize {
                        width: 100.0,
                        height: 1000.0,
                    },
                    paragraphs,
                )
            })
            .collect();
        LayoutDocument::new(pages)
    }

    fn texts(doc: &LayoutDocument) -> Vec<Vec<String>> {
        doc.pages()
            .iter()
            .map(|page| {
                page.paragraphs()
                    .iter()
                    .map(|p| p.text().to_string())
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    async fn preserves_page_and_paragraph_order() {
        let translator = Translator::new(FakeProvider::default());
        let out = translator.translate(doc(&[2, 0, 3])).await.expect("translate");
        assert_eq!(
            texts(&out),
            vec![
                vec!["P0-0", "P0-1"],
                vec![],
                vec!["P2-0", "P2-1", "P2-2"],
            ]
        );
        assert_eq!(*translator.provider().requests.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn chunks_respect_batch_limit() {
        let translator = Translator::new(FakeProvider {
            limit: Some(3),
            ..FakeProvider::default()
        });
        let out = translator.translate(doc(&[2, 2, 5])).await.expect("translate");
        assert_eq!(texts(&out)[2][4], "P2-4");
        assert_eq!(
            *translator.provider().requests.lock().unwrap(),
            vec![2, 2, 3, 2]
        );
    }

    #[tokio::test]
    async fn short_response_is_a_mismatch() {
        let translator = Translator::new(FakeProvider {
            drop_last: true,
            ..FakeProvider::default()
        });
        let err = translator.translate(doc(&[2])).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MismatchedBatchLength {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn provider_message_is_surfaced() {
        let translator = Translator::new(FakeProvider {
            fail: true,
            ..FakeProvider::default()
        });
        let err = translator.translate(doc(&[1])).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Fake translation failed: Quota Exceeded"
        );
    }

    #[tokio::test]
    async fn empty_document_skips_provider() {
        let translator = Translator::new(FakeProvider::default());
        let out = translator.translate(doc(&[0, 0])).await.expect("translate");
        assert_eq!(out.pages().len(), 2);
        assert!(translator.provider().requests.lock().unwrap().is_empty());
    }

    #[test]
    fn plans_page_bounded_chunks() {
        assert_eq!(
            plan_chunks(&[1, 1, 1], Some(2)),
            vec![Chunk { start: 0, len: 2 }, Chunk { start: 2, len: 1 }]
        );
        assert_eq!(plan_chunks(&[4], None), vec![Chunk { start: 0, len: 4 }]);
        assert!(plan_chunks(&[0], Some(2)).is_empty());
    }
}
