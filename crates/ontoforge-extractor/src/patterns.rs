//! Pattern catalogs and the compiled-pattern cache
//!
//! Each domain owns a static catalog of `(pattern, entity type, confidence)`
//! rules. Catalogs are compiled once per catalog identity and shared as
//! `Arc<[CompiledPattern]>`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use regex::Regex;

// ============================================================================
// Pattern Specs
// ============================================================================

/// A textual pattern rule
#[derive(Debug, Clone, Copy)]
pub struct PatternSpec {
    /// Regex source; capture group 1, when present, is the entity span
    pub pattern: &'static str,
    /// Entity type assigned to matches
    pub label: &'static str,
    /// Base confidence for matches
    pub confidence: f64,
    /// Strip leading/trailing capitalised function words from the span
    pub trim_common_words: bool,
}

const fn rule(pattern: &'static str, label: &'static str, confidence: f64) -> PatternSpec {
    PatternSpec {
        pattern,
        label,
        confidence,
        trim_common_words: false,
    }
}

const fn name_rule(pattern: &'static str, label: &'static str, confidence: f64) -> PatternSpec {
    PatternSpec {
        pattern,
        label,
        confidence,
        trim_common_words: true,
    }
}

/// A compiled pattern rule
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub label: String,
    pub confidence: f64,
    pub trim_common_words: bool,
}

impl CompiledPattern {
    /// Compile a single rule
    pub fn new(
        pattern: &str,
        label: impl Into<String>,
        confidence: f64,
        trim_common_words: bool,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            label: label.into(),
            confidence,
            trim_common_words,
        })
    }
}

/// Capitalised words that start sentences or titles but never name anything
pub const COMMON_CAPITALIZED: &[&str] = &[
    "A", "An", "And", "As", "At", "But", "By", "For", "From", "He", "Her", "His", "However",
    "If", "In", "It", "Its", "Of", "On", "Or", "She", "So", "That", "The", "Their", "Then",
    "There", "These", "They", "This", "Those", "To", "We", "When", "Where", "While", "With",
    "You", "Our", "After", "Before", "During", "Under", "Upon", "Each", "Every", "All", "Any",
    "Some", "No", "Not", "Yes", "Dr", "Mr", "Mrs", "Ms", "Prof", "Monday", "Tuesday",
    "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January", "February", "March",
    "April", "May", "June", "July", "August", "September", "October", "November", "December",
    "Section", "Clause", "Article", "Patient", "Inc", "Corp", "Ltd", "LLC",
    // sentence adverbs and connectives
    "Also", "Later", "Earlier", "Yesterday", "Today", "Tomorrow", "Tonight", "Now", "Still",
    "Meanwhile", "Finally", "Afterwards", "Eventually", "Recently", "Soon", "Once", "Next",
    "First", "Last", "Lastly", "Instead", "Otherwise", "Therefore", "Thus", "Hence",
    "Moreover", "Furthermore", "Additionally", "Nevertheless", "Although", "Because", "Since",
    "Unless", "Until", "Though", "Perhaps", "Maybe", "Indeed", "Here", "Again", "Only",
    // pronouns and determiners
    "Nobody", "Everyone", "Everybody", "Someone", "Somebody", "Anyone", "Anybody", "None",
    "Nothing", "Everything", "Something", "Anything", "Many", "Most", "Several", "Few", "Both",
    "Either", "Neither", "Such", "Another", "Other", "Others", "Him", "Them", "Me", "My",
    "Your", "What", "Who", "Which", "Why", "How",
];

// ============================================================================
// Catalogs
// ============================================================================

/// Patterns shared by every domain, appended after the domain-specific rules
pub static GENERAL_PATTERNS: &[PatternSpec] = &[
    name_rule(
        r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
        "Person",
        0.9,
    ),
    rule(
        r"\b([A-Z][A-Za-z&]*(?:\s+[A-Z][A-Za-z&]*)*\s+(?:Inc|LLC|Corp|Corporation|Ltd|GmbH|Co|Company|Group|Bank|University|Hospital|Foundation|Institute))\b\.?",
        "Organization",
        0.85,
    ),
    rule(r"\b\d{4}-\d{2}-\d{2}\b", "Date", 0.95),
    rule(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b", "Date", 0.9),
    rule(MONTH_DATE, "Date", 0.9),
    rule(r"\b\d{1,2}:\d{2}(?:\s?[AaPp][Mm])?", "Time", 0.85),
    rule(r"\b\d{1,2}\s?(?:am|pm|AM|PM)\b", "Time", 0.8),
    rule(
        r"(?:\$|€|£|\bUSD\s?|\bEUR\s?|\bGBP\s?)\d[\d,]*(?:\.\d{1,2})?(?:\s?(?:million|billion|thousand))?",
        "MonetaryAmount",
        0.9,
    ),
    rule(
        r"\b\d[\d,]*(?:\.\d+)?\s?(?:dollars|euros|pounds)\b",
        "MonetaryAmount",
        0.85,
    ),
    rule(
        r"\b\d+\s*(?:seconds?|minutes?|hours?|days?|weeks?|months?|years?)\b",
        "Duration",
        0.85,
    ),
    name_rule(
        r"\b(?:in|at|near)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
        "Location",
        0.7,
    ),
    rule(r#""([^"\n]{3,40})""#, "Concept", 0.6),
    name_rule(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b", "Person", 0.6),
];

const MONTH_DATE: &str = concat!(
    r"\b(?:",
    "January|February|March|April|May|June|July|August|September|October|November|December",
    r")\s+\d{1,2}(?:,\s*\d{4})?\b"
);

/// Legal documents: parties, contracts, clauses, statutes, courts
pub static LEGAL_PATTERNS: &[PatternSpec] = &[
    rule(
        r"\b(Licensor|Licensee|Buyer|Seller|Lessor|Lessee|Employer|Employee|Contractor|Client|Tenant|Landlord|Plaintiff|Defendant|Borrower|Lender)\b",
        "Party",
        0.85,
    ),
    rule(
        r"\b((?:[A-Z][a-z]+\s+)*(?:Agreement|Contract|Lease|License|Addendum|Amendment))\b",
        "Contract",
        0.85,
    ),
    rule(
        r"\b(?:Section|Clause|Article)\s+\d+(?:\.\d+)*\b",
        "Clause",
        0.9,
    ),
    rule(
        r"\b([A-Z][A-Za-z]*(?:\s+[A-Z][A-Za-z]*)*\s+Act(?:\s+of\s+\d{4})?)\b",
        "Statute",
        0.85,
    ),
    rule(
        r"\b(?:Supreme|District|Circuit|Superior|High|Appellate)\s+Court(?:\s+of\s+[A-Z][a-z]+)*\b",
        "Court",
        0.9,
    ),
    rule(
        r"(?i)\b(obligation|liability|indemnification|warranty|confidentiality|termination|breach|damages|jurisdiction)\b",
        "LegalConcept",
        0.75,
    ),
];

/// Clinical text: clinicians, patients, conditions, medication, dosage
pub static MEDICAL_PATTERNS: &[PatternSpec] = &[
    name_rule(
        r"\bDr\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
        "Physician",
        0.92,
    ),
    name_rule(
        r"\b(?:[Pp]atient)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
        "Patient",
        0.9,
    ),
    rule(
        r"(?i)\b(aspirin|ibuprofen|acetaminophen|paracetamol|metformin|insulin|amoxicillin|lisinopril|atorvastatin|warfarin|morphine|prednisone)\b",
        "Medication",
        0.9,
    ),
    rule(
        r"\b([a-z]+(?:cillin|mycin|pril|olol|statin|sartan|azole))\b",
        "Medication",
        0.75,
    ),
    rule(r"\b\d+(?:\.\d+)?\s?(?:mg|mcg|ml|mL|units?)\b", "Dosage", 0.9),
    rule(
        r"(?i)\b(diabetes|hypertension|asthma|pneumonia|cancer|influenza|arthritis|migraine|infection|depression|covid-19)\b",
        "Condition",
        0.85,
    ),
    rule(
        r"(?i)\b(fever|cough|headache|nausea|fatigue|dizziness|rash|shortness of breath)\b",
        "Symptom",
        0.8,
    ),
    rule(
        r"(?i)\b(surgery|biopsy|x-ray|mri|ct scan|blood test|vaccination|chemotherapy|dialysis)\b",
        "Procedure",
        0.8,
    ),
];

/// Business text: companies, percentages, metrics, markets
pub static BUSINESS_PATTERNS: &[PatternSpec] = &[
    rule(
        r"\b([A-Z][A-Za-z&]*(?:\s+[A-Z][A-Za-z&]*)*\s+(?:Inc|LLC|Corp|Corporation|Ltd|PLC|Holdings|Technologies|Group))\b\.?",
        "Company",
        0.9,
    ),
    rule(r"\b\d+(?:\.\d+)?\s?(?:%|percent\b)", "Percentage", 0.9),
    rule(
        r"(?i)\b(revenue|profit|earnings|ebitda|operating margin|market share|net income|sales growth)\b",
        "Metric",
        0.75,
    ),
    rule(r"\b([A-Z][a-z]+\s+market)\b", "Market", 0.7),
];

/// Verb frames between two mentions, active voice: first mention is the source
pub static VERB_FRAMES: &[PatternSpec] = &[
    rule(r"(?i)\b(?:reports|reported|reporting) to\b", "reports_to", 0.1),
    rule(r"(?i)\b(?:works|worked|working) (?:for|at)\b", "works_for", 0.1),
    rule(r"(?i)\b(?:manages|managed|manage|managing|leads|led)\b", "manages", 0.1),
    rule(r"(?i)\b(?:supervises|supervised|supervise|oversees|oversaw)\b", "supervises", 0.1),
    rule(r"(?i)\b(?:employs|employed|hires|hired)\b", "employs", 0.1),
    rule(r"(?i)\b(?:acquired|acquires|bought)\b", "acquired", 0.1),
    rule(r"(?i)\b(?:owns|owned)\b", "owns", 0.1),
    rule(r"(?i)\b(?:co-founded|founded|established)\b", "founded", 0.1),
    rule(r"(?i)\b(?:located|based|headquartered) in\b", "located_in", 0.1),
    rule(r"(?i)\b(?:signed|executed)\b", "signed", 0.1),
    rule(r"(?i)\b(?:obligates|binds)\b", "obligates", 0.1),
    rule(r"(?i)\b(?:governed by)\b", "governed_by", 0.1),
    rule(r"(?i)\b(?:treats|treated|treating)\b", "treats", 0.1),
    rule(r"(?i)\b(?:prescribed|prescribes)\b", "prescribes", 0.1),
    rule(r"(?i)\bdiagnosed with\b", "diagnosed_with", 0.1),
    rule(r"(?i)\b(?:pays|paid)\b", "pays", 0.1),
    rule(r"(?i)\b(?:part of|member of|belongs to)\b", "part_of", 0.1),
    rule(r"(?i)\b(?:causes|caused|leads to)\b", "causes", 0.1),
    rule(r"(?i)\b(?:reported|announced)\b", "reported", 0.1),
];

/// Passive verb frames: the second mention is the source
pub static PASSIVE_VERB_FRAMES: &[PatternSpec] = &[
    rule(r"(?i)\b(?:employed|hired) by\b", "employs", 0.1),
    rule(r"(?i)\b(?:managed|led) by\b", "manages", 0.1),
    rule(r"(?i)\b(?:supervised|overseen) by\b", "supervises", 0.1),
    rule(r"(?i)\b(?:founded|established) by\b", "founded", 0.1),
    rule(r"(?i)\b(?:treated) by\b", "treats", 0.1),
    rule(r"(?i)\b(?:acquired|bought) by\b", "acquired", 0.1),
    rule(r"(?i)\b(?:owned) by\b", "owns", 0.1),
];

/// Domain catalogs: domain-specific rules come first so they win ties
pub struct DomainCatalog {
    pub domain: &'static str,
    pub specific: &'static [PatternSpec],
}

static CATALOGS: &[DomainCatalog] = &[
    DomainCatalog {
        domain: "legal",
        specific: LEGAL_PATTERNS,
    },
    DomainCatalog {
        domain: "medical",
        specific: MEDICAL_PATTERNS,
    },
    DomainCatalog {
        domain: "business",
        specific: BUSINESS_PATTERNS,
    },
];

/// Pattern sets scanned for a domain, in priority order
pub fn catalog_for_domain(domain: &str) -> Vec<&'static [PatternSpec]> {
    let profile = ontoforge_core::DomainProfile::for_domain(domain);
    let mut sets: Vec<&'static [PatternSpec]> = CATALOGS
        .iter()
        .filter(|c| c.domain == profile.name)
        .map(|c| c.specific)
        .collect();
    sets.push(GENERAL_PATTERNS);
    sets
}

// ============================================================================
// Pattern Compiler
// ============================================================================

/// Compiles pattern catalogs once per catalog identity
///
/// The cache key is the address and length of the static slice, so two
/// catalogs with identical text are still compiled separately.
pub struct PatternCompiler {
    cache: Cache<(usize, usize), Arc<[CompiledPattern]>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PatternCompiler {
    /// Create an empty compiler cache
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Compile a catalog, reusing an earlier compilation of the same slice
    pub fn compile(&self, specs: &'static [PatternSpec]) -> Arc<[CompiledPattern]> {
        let key = (specs.as_ptr() as usize, specs.len());

        if let Some(compiled) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return compiled;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled: Arc<[CompiledPattern]> = compile_specs(specs).into();
        tracing::debug!(patterns = compiled.len(), "compiled pattern catalog");
        self.cache.insert(key, Arc::clone(&compiled));
        compiled
    }

    /// Number of cache hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of cache misses (compilations)
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for PatternCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_specs(specs: &[PatternSpec]) -> Vec<CompiledPattern> {
    specs
        .iter()
        .filter_map(|spec| {
            match CompiledPattern::new(
                spec.pattern,
                spec.label,
                spec.confidence,
                spec.trim_common_words,
            ) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    tracing::warn!(pattern = spec.pattern, error = %e, "skipping invalid pattern");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    static DUPLICATE_TEXT: &[PatternSpec] = &[rule(r"\d+", "Number", 0.5)];
    static DUPLICATE_TEXT_AGAIN: &[PatternSpec] = &[rule(r"\d+", "Number", 0.5)];

    #[test]
    fn test_all_catalog_patterns_compile() {
        for specs in [
            GENERAL_PATTERNS,
            LEGAL_PATTERNS,
            MEDICAL_PATTERNS,
            BUSINESS_PATTERNS,
            VERB_FRAMES,
            PASSIVE_VERB_FRAMES,
        ] {
            for spec in specs {
                assert!(
                    Regex::new(spec.pattern).is_ok(),
                    "pattern failed to compile: {}",
                    spec.pattern
                );
            }
        }
    }

    #[test]
    fn test_compile_is_cached_by_identity() {
        let compiler = PatternCompiler::new();

        let first = compiler.compile(GENERAL_PATTERNS);
        let second = compiler.compile(GENERAL_PATTERNS);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compiler.misses(), 1);
        assert_eq!(compiler.hits(), 1);
    }

    #[test]
    fn test_identical_text_in_distinct_catalogs_misses() {
        let compiler = PatternCompiler::new();

        compiler.compile(DUPLICATE_TEXT);
        compiler.compile(DUPLICATE_TEXT_AGAIN);

        assert_eq!(compiler.misses(), 2);
        assert_eq!(compiler.hits(), 0);
    }

    #[test]
    fn test_catalog_for_domain_orders_specific_first() {
        let sets = catalog_for_domain("medical");
        assert_eq!(sets.len(), 2);
        assert!(std::ptr::eq(sets[0], MEDICAL_PATTERNS));
        assert!(std::ptr::eq(sets[1], GENERAL_PATTERNS));

        assert_eq!(catalog_for_domain("general").len(), 1);
        assert_eq!(catalog_for_domain("unknown").len(), 1);
    }

    #[test]
    fn test_month_date_rule() {
        let regex = Regex::new(MONTH_DATE).unwrap();
        assert!(regex.is_match("signed on March 3, 2024 by"));
    }
}
