//! Citation graph document for visualisation front-ends.

use std::collections::{BTreeMap, HashSet};

use blatt_common::{RankedPaper, Relationship};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    pub first_author: String,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub citations: u32,
    pub priority: u8,
    pub matched_keywords: Vec<String>,
    pub reason: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_papers: usize,
    pub total_relationships: usize,
    /// Count per priority 1..=5, every level present.
    pub priority_distribution: BTreeMap<u8, usize>,
    pub year_range: Option<(i32, i32)>,
    pub relationship_type_distribution: BTreeMap<String, usize>,
    /// Rounded to one decimal.
    pub average_citations: f64,
    pub max_citations: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub stats: GraphStats,
}

/// Build the graph. Edges with an endpoint outside `papers` are dropped.
pub fn build(papers: &[RankedPaper], relationships: &[Relationship]) -> GraphDocument {
    let ids: HashSet<&str> = papers.iter().map(|r| r.paper.id.as_str()).collect();

    let nodes: Vec<GraphNode> = papers
        .iter()
        .map(|r| GraphNode {
            id: r.paper.id.clone(),
            title: r.paper.title.clone(),
            first_author: r.paper.first_author().to_string(),
            year: r.paper.year,
            venue: r.paper.venue.clone(),
            citations: r.paper.citation_count,
            priority: r.priority(),
            matched_keywords: r.score.matched_keywords.clone(),
            reason: r.score.reason.clone(),
            url: r.paper.url.clone(),
        })
        .collect();

    let edges: Vec<GraphEdge> = relationships
        .iter()
        .filter(|rel| ids.contains(rel.source_paper_id.as_str()) && ids.contains(rel.target_paper_id.as_str()))
        .map(|rel| GraphEdge {
            source: rel.source_paper_id.clone(),
            target: rel.target_paper_id.clone(),
            relationship_type: rel.relationship_type.as_str().to_string(),
            description: rel.description.clone(),
        })
        .collect();

    let stats = stats(&nodes, &edges);
    GraphDocument { nodes, edges, stats }
}

fn stats(nodes: &[GraphNode], edges: &[GraphEdge]) -> GraphStats {
    let mut priority_distribution: BTreeMap<u8, usize> = (1..=5).map(|p| (p, 0)).collect();
    for n in nodes {
        *priority_distribution.entry(n.priority).or_default() += 1;
    }

    let years = nodes.iter().filter_map(|n| n.year);
    let year_range = years.clone().min().zip(years.max());

    let mut relationship_type_distribution = BTreeMap::new();
    for e in edges {
        *relationship_type_distribution.entry(e.relationship_type.clone()).or_default() += 1;
    }

    let total: u64 = nodes.iter().map(|n| n.citations as u64).sum();
    let average_citations = if nodes.is_empty() {
        0.0
    } else {
        (total as f64 / nodes.len() as f64 * 10.0).round() / 10.0
    };

    GraphStats {
        total_papers: nodes.len(),
        total_relationships: edges.len(),
        priority_distribution,
        year_range,
        relationship_type_distribution,
        average_citations,
        max_citations: nodes.iter().map(|n| n.citations).max().unwrap_or(0),
    }
}
