//! Domain taxonomies
//!
//! Each domain names the entity and relationship types it expects, the
//! endpoint signatures that make a relationship plausible, and the rough
//! vocabulary size of a well-extracted document.

/// Relationship type that fits any pair of endpoints
pub const GENERIC_RELATIONSHIP: &str = "related_to";

/// Plausible endpoints for a relationship type (`"*"` matches any type)
#[derive(Debug, Clone, Copy)]
pub struct RelationshipSignature {
    pub relationship_type: &'static str,
    pub source_types: &'static [&'static str],
    pub target_types: &'static [&'static str],
}

impl RelationshipSignature {
    fn accepts(types: &[&str], entity_type: &str) -> bool {
        types.iter().any(|t| *t == "*" || *t == entity_type)
    }

    /// Whether this signature accepts the given endpoints
    pub fn matches(&self, source_type: &str, target_type: &str) -> bool {
        Self::accepts(self.source_types, source_type)
            && Self::accepts(self.target_types, target_type)
    }
}

/// Expected taxonomy for one domain
#[derive(Debug, Clone, Copy)]
pub struct DomainProfile {
    pub name: &'static str,
    pub entity_types: &'static [&'static str],
    pub relationship_types: &'static [&'static str],
    pub signatures: &'static [RelationshipSignature],
    /// Entity count of a typical well-covered document
    pub expected_entities: usize,
    /// Relationships per entity in a well-connected ontology
    pub expected_relationship_ratio: f64,
}

const AGENTS: &[&str] = &["Person", "Organization", "Company", "Party", "Physician"];

const SHARED_SIGNATURES: &[RelationshipSignature] = &[
    RelationshipSignature {
        relationship_type: "manages",
        source_types: AGENTS,
        target_types: &["Person", "Organization", "Company", "Product"],
    },
    RelationshipSignature {
        relationship_type: "supervises",
        source_types: AGENTS,
        target_types: &["Person", "Physician"],
    },
    RelationshipSignature {
        relationship_type: "reports_to",
        source_types: &["Person", "Physician"],
        target_types: AGENTS,
    },
    RelationshipSignature {
        relationship_type: "employs",
        source_types: &["Organization", "Company", "Person"],
        target_types: &["Person", "Physician"],
    },
    RelationshipSignature {
        relationship_type: "works_for",
        source_types: &["Person", "Physician"],
        target_types: &["Organization", "Company", "Person"],
    },
    RelationshipSignature {
        relationship_type: "owns",
        source_types: AGENTS,
        target_types: &["*"],
    },
    RelationshipSignature {
        relationship_type: "located_in",
        source_types: &["*"],
        target_types: &["Location"],
    },
    RelationshipSignature {
        relationship_type: "founded",
        source_types: &["Person", "Organization", "Company"],
        target_types: &["Organization", "Company"],
    },
    RelationshipSignature {
        relationship_type: "occurred_on",
        source_types: &["*"],
        target_types: &["Date", "Time"],
    },
    RelationshipSignature {
        relationship_type: "pays",
        source_types: AGENTS,
        target_types: &["*"],
    },
    RelationshipSignature {
        relationship_type: "part_of",
        source_types: &["*"],
        target_types: &["*"],
    },
    RelationshipSignature {
        relationship_type: "causes",
        source_types: &["*"],
        target_types: &["*"],
    },
];

const LEGAL_SIGNATURES: &[RelationshipSignature] = &[
    RelationshipSignature {
        relationship_type: "signed",
        source_types: &["Party", "Person", "Organization"],
        target_types: &["Contract", "Clause"],
    },
    RelationshipSignature {
        relationship_type: "obligates",
        source_types: &["Contract", "Clause", "Statute"],
        target_types: &["Party", "Person", "Organization"],
    },
    RelationshipSignature {
        relationship_type: "governed_by",
        source_types: &["Contract", "Clause"],
        target_types: &["Statute", "Court", "Location"],
    },
];

const MEDICAL_SIGNATURES: &[RelationshipSignature] = &[
    RelationshipSignature {
        relationship_type: "treats",
        source_types: &["Physician", "Medication", "Procedure", "Person"],
        target_types: &["Patient", "Condition", "Person"],
    },
    RelationshipSignature {
        relationship_type: "prescribes",
        source_types: &["Physician", "Person"],
        target_types: &["Medication", "Dosage"],
    },
    RelationshipSignature {
        relationship_type: "diagnosed_with",
        source_types: &["Patient", "Person"],
        target_types: &["Condition", "Symptom"],
    },
];

const BUSINESS_SIGNATURES: &[RelationshipSignature] = &[
    RelationshipSignature {
        relationship_type: "acquired",
        source_types: &["Company", "Organization"],
        target_types: &["Company", "Organization", "Product"],
    },
    RelationshipSignature {
        relationship_type: "reported",
        source_types: &["Company", "Organization"],
        target_types: &["MonetaryAmount", "Metric", "Percentage"],
    },
];

static GENERAL: DomainProfile = DomainProfile {
    name: "general",
    entity_types: &[
        "Person",
        "Organization",
        "Location",
        "Date",
        "Time",
        "Duration",
        "MonetaryAmount",
        "Concept",
        "Event",
        "Product",
    ],
    relationship_types: &[
        "manages",
        "supervises",
        "reports_to",
        "employs",
        "works_for",
        "owns",
        "located_in",
        "founded",
        "occurred_on",
        "pays",
        "part_of",
        "causes",
        GENERIC_RELATIONSHIP,
    ],
    signatures: SHARED_SIGNATURES,
    expected_entities: 8,
    expected_relationship_ratio: 0.5,
};

static LEGAL: DomainProfile = DomainProfile {
    name: "legal",
    entity_types: &[
        "Party",
        "Person",
        "Organization",
        "Contract",
        "Clause",
        "Statute",
        "Court",
        "Obligation",
        "Right",
        "LegalConcept",
        "Date",
        "MonetaryAmount",
        "Duration",
        "Location",
    ],
    relationship_types: &[
        "signed",
        "obligates",
        "governed_by",
        "pays",
        "owns",
        "employs",
        "located_in",
        "occurred_on",
        "part_of",
        GENERIC_RELATIONSHIP,
    ],
    signatures: LEGAL_SIGNATURES,
    expected_entities: 15,
    expected_relationship_ratio: 0.6,
};

static MEDICAL: DomainProfile = DomainProfile {
    name: "medical",
    entity_types: &[
        "Patient",
        "Physician",
        "Person",
        "Condition",
        "Symptom",
        "Medication",
        "Dosage",
        "Procedure",
        "BodyPart",
        "Organization",
        "Date",
        "Duration",
    ],
    relationship_types: &[
        "treats",
        "prescribes",
        "diagnosed_with",
        "causes",
        "part_of",
        "occurred_on",
        "works_for",
        GENERIC_RELATIONSHIP,
    ],
    signatures: MEDICAL_SIGNATURES,
    expected_entities: 12,
    expected_relationship_ratio: 0.6,
};

static BUSINESS: DomainProfile = DomainProfile {
    name: "business",
    entity_types: &[
        "Company",
        "Organization",
        "Person",
        "Product",
        "MonetaryAmount",
        "Percentage",
        "Metric",
        "Market",
        "Date",
        "Location",
    ],
    relationship_types: &[
        "acquired",
        "reported",
        "employs",
        "works_for",
        "manages",
        "founded",
        "owns",
        "located_in",
        "occurred_on",
        GENERIC_RELATIONSHIP,
    ],
    signatures: BUSINESS_SIGNATURES,
    expected_entities: 12,
    expected_relationship_ratio: 0.5,
};

impl DomainProfile {
    /// Profile for a domain name; unknown domains use the general profile
    pub fn for_domain(domain: &str) -> &'static DomainProfile {
        match domain.trim().to_lowercase().as_str() {
            "legal" => &LEGAL,
            "medical" => &MEDICAL,
            "business" | "financial" => &BUSINESS,
            _ => &GENERAL,
        }
    }

    /// Whether the domain expects this entity type
    pub fn expects_entity_type(&self, entity_type: &str) -> bool {
        self.entity_types.contains(&entity_type)
    }

    /// Whether the domain expects this relationship type
    pub fn expects_relationship_type(&self, relationship_type: &str) -> bool {
        self.relationship_types.contains(&relationship_type)
    }

    /// Signatures consulted for a relationship type, domain-specific first
    pub fn signatures_for(
        &self,
        relationship_type: &str,
    ) -> impl Iterator<Item = &'static RelationshipSignature> + '_ {
        let relationship_type = relationship_type.to_string();
        self.signatures
            .iter()
            .chain(SHARED_SIGNATURES.iter())
            .filter(move |s| s.relationship_type == relationship_type)
    }

    /// Plausibility of a typed relationship between two entity types:
    /// 1.0 for a matching signature, 0.5 for the generic type, 0.0 otherwise
    pub fn relationship_plausibility(
        &self,
        relationship_type: &str,
        source_type: &str,
        target_type: &str,
    ) -> f64 {
        if relationship_type == GENERIC_RELATIONSHIP {
            return 0.5;
        }
        let mut known = false;
        for signature in self.signatures_for(relationship_type) {
            known = true;
            if signature.matches(source_type, target_type) {
                return 1.0;
            }
        }
        if known {
            0.0
        } else {
            0.25
        }
    }
}
