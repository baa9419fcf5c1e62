//! Pattern-matching query parser.
//!
//! Intent patterns are evaluated in declared order and only a strictly
//! higher confidence replaces the current winner, so earlier-declared
//! intents take ties.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::{Aggregation, EntityKind, ExtractedEntity, ParsedQuery, QueryIntent};

const CONTRACTIONS: &[(&str, &str)] = &[
    ("don't", "do not"),
    ("won't", "will not"),
    ("can't", "cannot"),
    ("n't", " not"),
    ("'re", " are"),
    ("'ve", " have"),
    ("'ll", " will"),
    ("'d", " would"),
];

/// Heuristic natural-language query parser.
pub struct QueryParser {
    entity_patterns: Vec<(EntityKind, Regex)>,
    intent_patterns: Vec<(QueryIntent, Regex, f64)>,
    sort_re: Regex,
    limit_res: Vec<Regex>,
    relation_re: Regex,
    status_re: Regex,
    type_re: Regex,
    priority_re: Regex,
    created_after_re: Regex,
    created_before_re: Regex,
    numeric_cmp_re: Regex,
    agg_field_re: Regex,
    group_by_re: Regex,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryParser {
    pub fn new() -> Self {
        let entity_patterns = vec![
            (EntityKind::Person, Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").unwrap()),
            (
                EntityKind::Person,
                Regex::new(r"\b(?:Mr\.|Mrs\.|Ms\.|Dr\.) [A-Z][a-z]+\b").unwrap(),
            ),
            (
                EntityKind::Organization,
                Regex::new(r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)* (?:Inc|LLC|Ltd|Corp|Company|Organization)\b")
                    .unwrap(),
            ),
            (EntityKind::Date, Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").unwrap()),
            (EntityKind::Date, Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap()),
            (
                EntityKind::Date,
                Regex::new(r"\b(?:yesterday|today|tomorrow|(?:last|next) (?:week|month|year))\b").unwrap(),
            ),
            (
                EntityKind::Location,
                Regex::new(r"\b[A-Z][a-z]+, [A-Z]{2}\b").unwrap(),
            ),
            (
                EntityKind::Event,
                Regex::new(r"\b[A-Z][a-z]+ (?:Meeting|Conference|Summit|Event)\b").unwrap(),
            ),
            (EntityKind::Task, Regex::new(r"\btask #?\d+\b").unwrap()),
        ];

        // Declared order is the tie-break order.
        let intent_patterns = vec![
            (
                QueryIntent::SearchEntity,
                Regex::new(r"\b(?:find|search|show|get|list)\b").unwrap(),
                0.9,
            ),
            (QueryIntent::SearchEntity, Regex::new(r"\b(?:who|what|where|which)\b").unwrap(), 0.8),
            (
                QueryIntent::SearchEntity,
                Regex::new(r"\b(?:people|persons?|organizations?|companies|entities)\b").unwrap(),
                0.7,
            ),
            (
                QueryIntent::FindRelationship,
                Regex::new(r"\b(?:relationship|connection|association|link) between\b").unwrap(),
                0.95,
            ),
            (
                QueryIntent::FindRelationship,
                Regex::new(r"\b(?:related|connected|associated|linked)\b").unwrap(),
                0.9,
            ),
            (
                QueryIntent::FindRelationship,
                Regex::new(r"\b(?:who knows|connected to|works with)\b").unwrap(),
                0.85,
            ),
            (
                QueryIntent::AggregateData,
                Regex::new(r"\b(?:count|sum|average|total|statistics)\b").unwrap(),
                0.9,
            ),
            (QueryIntent::AggregateData, Regex::new(r"\bhow (?:many|much)\b").unwrap(), 0.92),
            (
                QueryIntent::AggregateData,
                Regex::new(r"\b(?:group by|grouped|categorized)\b").unwrap(),
                0.9,
            ),
            (
                QueryIntent::FilterResults,
                Regex::new(r"\b(?:created|updated|modified) (?:after|before|between)\b").unwrap(),
                0.92,
            ),
            (
                QueryIntent::FilterResults,
                Regex::new(r"\b(?:status|state|type) (?:is|equals?)\b").unwrap(),
                0.85,
            ),
            (QueryIntent::FilterResults, Regex::new(r"\b(?:filter|where|only|just)\b").unwrap(), 0.8),
            (QueryIntent::SortResults, Regex::new(r"\b(?:sort|order) by\b").unwrap(), 0.95),
            (
                QueryIntent::SortResults,
                Regex::new(r"\b(?:alphabetical|chronological)\b").unwrap(),
                0.85,
            ),
            (QueryIntent::ExplainEntity, Regex::new(r"\b(?:explain|why|describe)\b").unwrap(), 0.8),
            (
                QueryIntent::CompareEntities,
                Regex::new(r"\b(?:compare|versus|vs|difference between)\b").unwrap(),
                0.9,
            ),
            (
                QueryIntent::CompareEntities,
                Regex::new(r"\b(?:similar|different|alike)\b").unwrap(),
                0.7,
            ),
        ];

        Self {
            entity_patterns,
            intent_patterns,
            sort_re: Regex::new(r"\bsort(?:ed)? by (\w+)(?: (asc|desc|ascending|descending))?\b").unwrap(),
            limit_res: vec![
                Regex::new(r"\b(?:top|first|limit) (\d+)\b").unwrap(),
                Regex::new(r"\b(\d+) results?\b").unwrap(),
            ],
            relation_re: Regex::new(r"\b(?:with|including|and) their (\w+)\b").unwrap(),
            status_re: Regex::new(r"\bstatus (?:is |= )?(\w+)\b").unwrap(),
            type_re: Regex::new(r"\btype (?:is |= )?(\w+)\b").unwrap(),
            priority_re: Regex::new(r"\bpriority (?:is |= )?(\w+)\b").unwrap(),
            created_after_re: Regex::new(r"\bcreated after ([0-9][0-9-/]+)\b").unwrap(),
            created_before_re: Regex::new(r"\bcreated before ([0-9][0-9-/]+)\b").unwrap(),
            numeric_cmp_re: Regex::new(r"\b(\w+) (?:greater|more|higher) than (\d+(?:\.\d+)?)\b").unwrap(),
            agg_field_re: Regex::new(r"\b(sum|average|total) of (\w+)\b").unwrap(),
            group_by_re: Regex::new(r"\bgroup(?:ed)? by (\w+)\b").unwrap(),
        }
    }

    /// Parse a free-form query string.
    pub fn parse(&self, query: &str) -> ParsedQuery {
        if query.trim().is_empty() {
            return ParsedQuery::empty(query);
        }

        let normalized = self.normalize(query);
        let lower = normalized.to_lowercase();

        let entities = self.extract_entities(&normalized);
        let (intent, mut confidence) = self.classify_intent(&lower);
        let filters = self.extract_filters(&lower, &entities);
        let sort_criteria = self.extract_sort_criteria(&lower);
        let limit = self.extract_limit(&lower);
        let relationships = self.extract_relationships(&lower);
        let aggregations = self.extract_aggregations(&lower);

        // A query with recognizable entities is still searchable even when no
        // intent pattern fired.
        let intent = if intent == QueryIntent::Unknown && !entities.is_empty() {
            confidence = 0.6;
            QueryIntent::SearchEntity
        } else {
            intent
        };

        debug!(intent = intent.as_str(), confidence, entities = entities.len(), "parsed query");

        ParsedQuery {
            original_text: query.to_string(),
            intent,
            entities,
            filters,
            sort_criteria,
            limit,
            relationships_to_include: relationships,
            aggregations,
            confidence,
        }
    }

    fn normalize(&self, query: &str) -> String {
        let mut out = query.split_whitespace().collect::<Vec<_>>().join(" ");
        for (contraction, expansion) in CONTRACTIONS {
            out = out.replace(contraction, expansion);
        }
        out
    }

    fn extract_entities(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut entities = Vec::new();
        for (kind, pattern) in &self.entity_patterns {
            for m in pattern.find_iter(text) {
                let quoted = is_quoted(text, m.start(), m.end());
                entities.push(ExtractedEntity {
                    text: m.as_str().to_string(),
                    kind: *kind,
                    confidence: if quoted { 0.95 } else { 0.8 },
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
        remove_overlapping(entities)
    }

    fn classify_intent(&self, lower: &str) -> (QueryIntent, f64) {
        let mut best = QueryIntent::Unknown;
        let mut best_confidence = 0.0_f64;
        for (intent, pattern, confidence) in &self.intent_patterns {
            if *confidence > best_confidence && pattern.is_match(lower) {
                best = *intent;
                best_confidence = *confidence;
            }
        }
        (best, best_confidence)
    }

    fn extract_filters(&self, lower: &str, entities: &[ExtractedEntity]) -> HashMap<String, Value> {
        let mut filters = HashMap::new();

        for (re, key) in [
            (&self.status_re, "status"),
            (&self.type_re, "type"),
            (&self.priority_re, "priority"),
        ] {
            if let Some(caps) = re.captures(lower) {
                filters.insert(key.to_string(), json!(caps[1].to_string()));
            }
        }
        if let Some(caps) = self.created_after_re.captures(lower) {
            filters.insert("created_after".to_string(), json!(caps[1].to_string()));
        }
        if let Some(caps) = self.created_before_re.captures(lower) {
            filters.insert("created_before".to_string(), json!(caps[1].to_string()));
        }
        if let Some(caps) = self.numeric_cmp_re.captures(lower) {
            if let Ok(value) = caps[2].parse::<f64>() {
                filters.insert(format!("{}_gt", &caps[1]), json!(value));
            }
        }

        for entity in entities {
            match entity.kind {
                EntityKind::Person => {
                    filters.insert("owner".to_string(), json!(entity.text.clone()));
                }
                EntityKind::Organization => {
                    filters.insert("organization".to_string(), json!(entity.text.clone()));
                }
                EntityKind::Location => {
                    filters.insert("location".to_string(), json!(entity.text.clone()));
                }
                _ => {}
            }
        }

        filters
    }

    fn extract_sort_criteria(&self, lower: &str) -> Vec<(String, String)> {
        let mut criteria = Vec::new();
        if let Some(caps) = self.sort_re.captures(lower) {
            let field = caps[1].to_string();
            let direction = caps
                .get(2)
                .map(|m| m.as_str())
                .filter(|d| d.contains("desc"))
                .map(|_| "desc")
                .unwrap_or("asc");
            criteria.push((field, direction.to_string()));
        }
        if lower.contains("latest") || lower.contains("newest") || lower.contains("most recent") {
            criteria.push(("created_at".to_string(), "desc".to_string()));
        } else if lower.contains("oldest") || lower.contains("earliest") {
            criteria.push(("created_at".to_string(), "asc".to_string()));
        } else if lower.contains("alphabetical") {
            criteria.push(("name".to_string(), "asc".to_string()));
        }
        criteria
    }

    fn extract_limit(&self, lower: &str) -> Option<usize> {
        for re in &self.limit_res {
            if let Some(caps) = re.captures(lower) {
                if let Ok(n) = caps[1].parse() {
                    return Some(n);
                }
            }
        }
        None
    }

    fn extract_relationships(&self, lower: &str) -> Vec<String> {
        self.relation_re
            .captures_iter(lower)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    fn extract_aggregations(&self, lower: &str) -> Vec<Aggregation> {
        let mut aggs = Vec::new();
        if lower.contains("how many") || lower.contains("count") {
            aggs.push(HashMap::from([("op".to_string(), json!("count"))]));
        }
        for caps in self.agg_field_re.captures_iter(lower) {
            let op = match &caps[1] {
                "average" => "avg",
                "total" | "sum" => "sum",
                other => other,
            };
            aggs.push(HashMap::from([
                ("op".to_string(), json!(op)),
                ("field".to_string(), json!(caps[2].to_string())),
            ]));
        }
        if let Some(caps) = self.group_by_re.captures(lower) {
            aggs.push(HashMap::from([
                ("op".to_string(), json!("group_by")),
                ("field".to_string(), json!(caps[1].to_string())),
            ]));
        }
        aggs
    }
}

fn is_quoted(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].rfind('"');
    let after = text[end..].find('"');
    matches!((before, after), (Some(_), Some(_)))
}

/// Keep the higher-confidence entity when spans overlap; ties keep the
/// earlier extraction.
fn remove_overlapping(mut entities: Vec<ExtractedEntity>) -> Vec<ExtractedEntity> {
    entities.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.start.cmp(&b.start))
    });
    let mut kept: Vec<ExtractedEntity> = Vec::new();
    for entity in entities {
        let overlaps = kept
            .iter()
            .any(|k| entity.start < k.end && k.start < entity.end);
        if !overlaps {
            kept.push(entity);
        }
    }
    kept.sort_by_key(|e| e.start);
    kept
}
