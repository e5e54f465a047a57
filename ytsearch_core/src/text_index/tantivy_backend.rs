//! Default `TextIndex` implementation, grounded on the `tantivy` crate.
//!
//! Each shard's schema has fixed `title`/`description`/`keywords` fields plus a
//! single `captions` JSON field whose keys are caption-track language names —
//! tantivy's JSON field support is the natural expression of "dynamic per-language
//! fields" (§4.I) without rebuilding the schema every time a new language appears.
//!
//! A shard's *persisted* form is its source `Video` documents, not tantivy's own
//! segment files: on `open`, the tantivy index is rebuilt in RAM from those
//! documents. This keeps the on-disk snapshot a single opaque, version-tagged
//! blob (§4.B) instead of a multi-file segment directory, at the cost of a
//! rebuild on every load — acceptable since shards are bounded to `shard_size`
//! videos (§4.F) and are released when idle (§4.I).

use crate::error::{Error, Result};
use crate::model::{Video, VideoId};
use crate::text_index::{FieldHit, FuzzyParams, IndexField, SearchHit, TextIndex, TextIndexShard};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query};
use tantivy::schema::{Schema, Value, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term};

const SNAPSHOT_MAGIC: u32 = 0x59545831; // "YTX1"

#[derive(serde::Serialize, serde::Deserialize)]
struct Snapshot {
    videos: Vec<Video>,
}

pub struct TantivyTextIndex {
    root: PathBuf,
}

impl TantivyTextIndex {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, shard_key: &str) -> PathBuf {
        self.root.join(format!("{}.idx", sanitize(shard_key)))
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait::async_trait]
impl TextIndex for TantivyTextIndex {
    async fn open(&self, shard_key: &str) -> Result<Option<Box<dyn TextIndexShard>>> {
        let path = self.path_for(shard_key);
        let raw = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage(e.to_string())),
        };
        if raw.len() < 4 || u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) != SNAPSHOT_MAGIC {
            tracing::warn!(target: "ytsearch.index_store", shard_key, "format mismatch, deleting shard snapshot");
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        let snapshot: Snapshot =
            serde_json::from_slice(&raw[4..]).map_err(|e| Error::storage(e.to_string()))?;
        let mut shard = TantivyShard::empty()?;
        for video in snapshot.videos {
            shard.add(&video)?;
        }
        shard.mark_clean();
        Ok(Some(Box::new(shard)))
    }

    async fn create(&self, _shard_key: &str) -> Result<Box<dyn TextIndexShard>> {
        Ok(Box::new(TantivyShard::empty()?))
    }

    async fn save(&self, shard_key: &str, shard: &dyn TextIndexShard) -> Result<()> {
        let videos: Vec<Video> = shard
            .documents()
            .into_iter()
            .filter_map(|id| shard.video(&id))
            .collect();
        let snapshot = Snapshot { videos };
        let mut out = SNAPSHOT_MAGIC.to_le_bytes().to_vec();
        out.extend(serde_json::to_vec(&snapshot).map_err(|e| Error::storage(e.to_string()))?);
        let path = self.path_for(shard_key);
        let tmp = path.with_extension("idx.tmp");
        std::fs::write(&tmp, &out)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn delete(&self, shard_key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(shard_key)) {
            Ok(()) | Err(_) => Ok(()),
        }
    }
}

/// `TextIndexShard` additionally exposes the source `Video` so the backend can
/// serialise it; not part of the public trait since other implementations may
/// not keep full documents around.
trait ShardSource {
    fn video(&self, id: &VideoId) -> Option<Video>;
}

struct TantivyShard {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    schema: ShardSchema,
    documents: HashMap<VideoId, Video>,
    batching: bool,
    dirty: bool,
}

struct ShardSchema {
    video_id: tantivy::schema::Field,
    title: tantivy::schema::Field,
    description: tantivy::schema::Field,
    keywords: tantivy::schema::Field,
    captions: tantivy::schema::Field,
}

impl TantivyShard {
    fn empty() -> Result<Self> {
        let mut builder = Schema::builder();
        let video_id = builder.add_text_field("video_id", STRING | STORED);
        let title = builder.add_text_field("title", TEXT | STORED);
        let description = builder.add_text_field("description", TEXT | STORED);
        let keywords = builder.add_text_field("keywords", TEXT | STORED);
        let captions = builder.add_json_field("captions", TEXT | STORED);
        let schema = builder.build();

        let index = Index::create_in_ram(schema);
        let writer = index
            .writer(15_000_000)
            .map_err(|e| Error::storage(e.to_string()))?;
        let reader = index
            .reader()
            .map_err(|e| Error::storage(e.to_string()))?;

        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
            schema: ShardSchema {
                video_id,
                title,
                description,
                keywords,
                captions,
            },
            documents: HashMap::new(),
            batching: false,
            dirty: false,
        })
    }

    fn commit_if_not_batching(&mut self) -> Result<()> {
        if !self.batching {
            self.commit()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.commit().map_err(|e| Error::storage(e.to_string()))?;
        drop(writer);
        self.reader
            .reload()
            .map_err(|e| Error::storage(e.to_string()))?;
        Ok(())
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn build_query(&self, query: &str) -> Box<dyn Query> {
        let terms: Vec<&str> = query.split_whitespace().collect();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        let languages = self.known_languages();

        for term in &terms {
            let params = FuzzyParams::for_term(term.len());
            let folded = unicode_normalization::UnicodeNormalization::nfkd(*term)
                .filter(|c| !c.is_ascii_punctuation())
                .collect::<String>()
                .to_lowercase();

            for field in [
                self.schema.title,
                self.schema.description,
                self.schema.keywords,
            ] {
                let t = Term::from_field_text(field, &folded);
                clauses.push((
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new(
                        t,
                        params.max_edit_distance,
                        params.transposition_cost_one,
                    )),
                ));
            }
            for lang in &languages {
                let mut t = Term::from_field_json_path(self.schema.captions, lang, false);
                t.append_type_and_str(&folded);
                clauses.push((
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new(
                        t,
                        params.max_edit_distance,
                        params.transposition_cost_one,
                    )),
                ));
            }
        }
        Box::new(BooleanQuery::new(clauses))
    }

    fn known_languages(&self) -> Vec<String> {
        let mut langs: HashSet<String> = HashSet::new();
        for video in self.documents.values() {
            for track in video.usable_caption_tracks() {
                langs.insert(track.language_name.clone());
            }
        }
        langs.into_iter().collect()
    }

    /// Locates byte ranges of this query's terms within `text`, case/accent-folded,
    /// accepting fuzzy matches within the same edit-distance budget as the index
    /// query. Used to recover the offsets the padded-match algebra (§4.K) needs,
    /// which tantivy's scoring path does not hand back directly.
    fn locate(&self, query: &str, text: &str) -> Vec<(usize, usize)> {
        let folded_text = fold(text);
        let mut ranges = Vec::new();
        for term in query.split_whitespace() {
            let folded_term = fold(term);
            if folded_term.is_empty() {
                continue;
            }
            let params = FuzzyParams::for_term(term.len());
            for (start, word) in word_spans(&folded_text) {
                if edit_distance_within(word, &folded_term, params.max_edit_distance) {
                    ranges.push((start, start + word.len()));
                }
            }
        }
        ranges.sort_unstable();
        ranges.dedup();
        ranges
    }
}

fn fold(s: &str) -> String {
    unicode_normalization::UnicodeNormalization::nfkd(s)
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .to_lowercase()
}

fn word_spans(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push((s, &text[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push((s, &text[s..]));
    }
    out
}

fn edit_distance_within(a: &str, b: &str, max: u8) -> bool {
    if a == b {
        return true;
    }
    if max == 0 {
        return false;
    }
    levenshtein(a, b) <= max as usize
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

impl ShardSource for TantivyShard {
    fn video(&self, id: &VideoId) -> Option<Video> {
        self.documents.get(id).cloned()
    }
}

impl TextIndexShard for TantivyShard {
    fn add(&mut self, video: &Video) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        let id_term = Term::from_field_text(self.schema.video_id, video.id.as_str());
        writer.delete_term(id_term);

        let mut doc = TantivyDocument::default();
        doc.add_text(self.schema.video_id, video.id.as_str());
        doc.add_text(self.schema.title, &video.title);
        doc.add_text(self.schema.description, &video.description);
        for kw in &video.keywords {
            doc.add_text(self.schema.keywords, kw);
        }
        let mut captions_obj = serde_json::Map::new();
        for track in video.usable_caption_tracks() {
            let full_text = crate::caption_text::full_text(track);
            captions_obj.insert(track.language_name.clone(), serde_json::Value::String(full_text));
        }
        doc.add_object(self.schema.captions, captions_obj);

        writer
            .add_document(doc)
            .map_err(|e| Error::storage(e.to_string()))?;
        drop(writer);

        self.documents.insert(video.id.clone(), video.clone());
        self.dirty = true;
        self.commit_if_not_batching()
    }

    fn remove(&mut self, id: &VideoId) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.delete_term(Term::from_field_text(self.schema.video_id, id.as_str()));
        drop(writer);
        self.documents.remove(id);
        self.dirty = true;
        self.commit_if_not_batching()
    }

    fn begin_batch(&mut self) {
        self.batching = true;
    }

    fn commit_batch(&mut self) -> Result<()> {
        self.batching = false;
        self.commit()
    }

    fn search(&self, query: &str, restrict: Option<&HashSet<VideoId>>) -> Result<Vec<SearchHit>> {
        let searcher = self.reader.searcher();
        let q = self.build_query(query);
        let top = searcher
            .search(&q, &TopDocs::with_limit(searcher.num_docs() as usize + 1))
            .map_err(|e| Error::storage(e.to_string()))?;

        let mut hits = Vec::new();
        for (score, addr) in top {
            let doc: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| Error::storage(e.to_string()))?;
            let id_value = doc
                .get_first(self.schema.video_id)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let video_id = VideoId::new(id_value);
            if let Some(r) = restrict {
                if !r.contains(&video_id) {
                    continue;
                }
            }
            let Some(video) = self.documents.get(&video_id) else {
                continue;
            };

            let mut fields = Vec::new();
            let title_ranges = self.locate(query, &video.title);
            if !title_ranges.is_empty() {
                fields.push(FieldHit {
                    field: IndexField::Title,
                    ranges: title_ranges,
                });
            }
            let desc_ranges = self.locate(query, &video.description);
            if !desc_ranges.is_empty() {
                fields.push(FieldHit {
                    field: IndexField::Description,
                    ranges: desc_ranges,
                });
            }
            let synthetic_keywords = video.keywords.join(" ");
            let kw_ranges = self.locate(query, &synthetic_keywords);
            if !kw_ranges.is_empty() {
                fields.push(FieldHit {
                    field: IndexField::Keywords,
                    ranges: kw_ranges,
                });
            }
            for track in video.usable_caption_tracks() {
                let full_text = crate::caption_text::full_text(track);
                let ranges = self.locate(query, &full_text);
                if !ranges.is_empty() {
                    fields.push(FieldHit {
                        field: IndexField::Caption(track.language_name.clone()),
                        ranges,
                    });
                }
            }
            if fields.is_empty() {
                continue;
            }
            hits.push(SearchHit {
                video_id,
                score,
                fields,
            });
        }
        Ok(hits)
    }

    fn contains(&self, id: &VideoId) -> bool {
        self.documents.contains_key(id)
    }

    fn documents(&self) -> Vec<VideoId> {
        self.documents.keys().cloned().collect()
    }

    fn dirty(&self) -> bool {
        self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Video;

    fn video(id: &str, title: &str) -> Video {
        Video::new(VideoId::new(id), title, "a description about rust programming")
    }

    #[tokio::test]
    async fn add_then_search_finds_title_hit() {
        let mut shard = TantivyShard::empty().unwrap();
        shard.add(&video("abc", "Learning Rust Programming")).unwrap();
        let hits = shard.search("rust", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].video_id, VideoId::new("abc"));
    }

    #[tokio::test]
    async fn remove_drops_from_results() {
        let mut shard = TantivyShard::empty().unwrap();
        shard.add(&video("abc", "Learning Rust Programming")).unwrap();
        shard.remove(&VideoId::new("abc")).unwrap();
        let hits = shard.search("rust", None).unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn restrict_filters_candidates() {
        let mut shard = TantivyShard::empty().unwrap();
        shard.add(&video("abc", "Rust programming basics")).unwrap();
        shard.add(&video("def", "Rust advanced patterns")).unwrap();
        let mut restrict = HashSet::new();
        restrict.insert(VideoId::new("abc"));
        let hits = shard.search("rust", Some(&restrict)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].video_id, VideoId::new("abc"));
    }
}
