//! Key-chunk selection over a document's chunk similarity graph
//!
//! Chunks are nodes; two chunks are joined when their embeddings are at least
//! `threshold` similar. A chunk's centrality blends weighted PageRank with
//! shortest-path betweenness, favouring PageRank.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::index::{cosine_similarity, IndexEntry};

const PAGERANK_WEIGHT: f32 = 0.7;
const BETWEENNESS_WEIGHT: f32 = 0.3;

/// PageRank configuration
#[derive(Debug, Clone)]
pub struct PageRankConfig {
    /// Damping factor
    pub damping: f32,
    pub max_iterations: usize,
    /// Convergence threshold per node
    pub epsilon: f32,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            epsilon: 1e-6,
        }
    }
}

/// A chunk with its centrality scores
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub entry: Arc<IndexEntry>,
    pub pagerank: f32,
    pub betweenness: f32,
    /// Weighted blend of `pagerank` and `betweenness`
    pub centrality: f32,
}

/// Undirected similarity graph over one document's entries
pub struct ChunkGraph {
    entries: Vec<Arc<IndexEntry>>,
    /// node -> (neighbor, similarity)
    edges: Vec<Vec<(usize, f32)>>,
}

impl ChunkGraph {
    /// Join every pair of entries with positive similarity of at least `threshold`
    pub fn build(entries: Vec<Arc<IndexEntry>>, threshold: f32) -> Self {
        let n = entries.len();
        let mut edges = vec![Vec::new(); n];

        for i in 0..n {
            for j in (i + 1)..n {
                let similarity = cosine_similarity(&entries[i].embedding, &entries[j].embedding);
                if similarity > 0.0 && similarity >= threshold {
                    edges[i].push((j, similarity));
                    edges[j].push((i, similarity));
                }
            }
        }

        Self { entries, edges }
    }

    pub fn node_count(&self) -> usize {
        self.entries.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Weighted PageRank; ranks sum to 1
    ///
    /// Isolated chunks spread their rank evenly over the graph.
    pub fn pagerank(&self, config: &PageRankConfig) -> Vec<f32> {
        let n = self.node_count();
        if n == 0 {
            return Vec::new();
        }

        let n_f32 = n as f32;
        let damping = config.damping;
        let out_weight: Vec<f32> = self
            .edges
            .iter()
            .map(|neighbors| neighbors.iter().map(|(_, w)| w).sum::<f32>())
            .collect();

        let mut ranks = vec![1.0 / n_f32; n];
        for _ in 0..config.max_iterations {
            let dangling: f32 = ranks
                .iter()
                .zip(&out_weight)
                .filter(|(_, w)| **w == 0.0)
                .map(|(r, _)| r)
                .sum();
            let base = (1.0 - damping) / n_f32 + damping * dangling / n_f32;

            let mut next = vec![base; n];
            for (source, neighbors) in self.edges.iter().enumerate() {
                if out_weight[source] == 0.0 {
                    continue;
                }
                let share = damping * ranks[source] / out_weight[source];
                for &(target, weight) in neighbors {
                    next[target] += share * weight;
                }
            }

            let diff: f32 = next.iter().zip(&ranks).map(|(a, b)| (a - b).abs()).sum();
            ranks = next;
            if diff < n_f32 * config.epsilon {
                break;
            }
        }

        ranks
    }

    /// Normalized shortest-path betweenness (Brandes, unweighted)
    pub fn betweenness(&self) -> Vec<f32> {
        let n = self.node_count();
        let mut centrality = vec![0.0f64; n];

        for source in 0..n {
            let mut stack = Vec::with_capacity(n);
            let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut paths = vec![0.0f64; n];
            let mut distance = vec![usize::MAX; n];
            paths[source] = 1.0;
            distance[source] = 0;

            let mut queue = VecDeque::from([source]);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for &(w, _) in &self.edges[v] {
                    if distance[w] == usize::MAX {
                        distance[w] = distance[v] + 1;
                        queue.push_back(w);
                    }
                    if distance[w] == distance[v] + 1 {
                        paths[w] += paths[v];
                        predecessors[w].push(v);
                    }
                }
            }

            let mut dependency = vec![0.0f64; n];
            while let Some(w) = stack.pop() {
                for &v in &predecessors[w] {
                    dependency[v] += paths[v] / paths[w] * (1.0 + dependency[w]);
                }
                if w != source {
                    centrality[w] += dependency[w];
                }
            }
        }

        // Ordered pairs, so each undirected path counts twice
        let scale = if n > 2 {
            1.0 / ((n - 1) * (n - 2)) as f64
        } else {
            0.0
        };
        centrality.into_iter().map(|c| (c * scale) as f32).collect()
    }

    /// The `limit` most central chunks, most central first
    ///
    /// Ties keep document order.
    pub fn key_chunks(&self, limit: usize) -> Vec<RankedChunk> {
        let pagerank = self.pagerank(&PageRankConfig::default());
        let betweenness = self.betweenness();

        let mut ranked: Vec<RankedChunk> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| RankedChunk {
                entry: Arc::clone(entry),
                pagerank: pagerank[i],
                betweenness: betweenness[i],
                centrality: PAGERANK_WEIGHT * pagerank[i] + BETWEENNESS_WEIGHT * betweenness[i],
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.centrality
                .total_cmp(&a.centrality)
                .then_with(|| a.entry.chunk.sequence_index.cmp(&b.entry.chunk.sequence_index))
        });
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, Document};

    fn entries(embeddings: &[[f32; 3]]) -> Vec<Arc<IndexEntry>> {
        let doc = Document::inline("Reg Z", "");
        embeddings
            .iter()
            .enumerate()
            .map(|(i, embedding)| {
                Arc::new(IndexEntry {
                    chunk: Chunk {
                        id: Chunk::id_for(doc.id, i),
                        document_id: doc.id,
                        sequence_index: i,
                        start_offset: i * 10,
                        end_offset: i * 10 + 10,
                        text: format!("section {}", i),
                        token_count: 2,
                    },
                    embedding: embedding.to_vec(),
                    metadata: doc.entry_metadata(),
                })
            })
            .collect()
    }

    /// Leaves are orthogonal to each other and all similar to the hub
    fn star() -> ChunkGraph {
        ChunkGraph::build(
            entries(&[
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 1.0, 1.0],
                [0.0, 0.0, 1.0],
            ]),
            0.5,
        )
    }

    #[test]
    fn test_star_graph_shape() {
        let graph = star();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_hub_is_most_central() {
        let graph = star();

        let ranks = graph.pagerank(&PageRankConfig::default());
        let total: f32 = ranks.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(ranks[2] > ranks[0] && ranks[2] > ranks[1] && ranks[2] > ranks[3]);

        let betweenness = graph.betweenness();
        assert!((betweenness[2] - 1.0).abs() < 1e-6);
        assert_eq!(betweenness[0], 0.0);

        let key = graph.key_chunks(2);
        assert_eq!(key.len(), 2);
        assert_eq!(key[0].entry.chunk.sequence_index, 2);
        assert!(key[0].centrality > key[1].centrality);
    }

    #[test]
    fn test_isolated_chunks_keep_document_order() {
        let graph = ChunkGraph::build(
            entries(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
            0.5,
        );
        assert_eq!(graph.edge_count(), 0);

        let ranks = graph.pagerank(&PageRankConfig::default());
        for rank in &ranks {
            assert!((rank - 1.0 / 3.0).abs() < 1e-5);
        }

        let order: Vec<usize> = graph
            .key_chunks(10)
            .iter()
            .map(|r| r.entry.chunk.sequence_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_graph() {
        let graph = ChunkGraph::build(Vec::new(), 0.5);
        assert!(graph.pagerank(&PageRankConfig::default()).is_empty());
        assert!(graph.betweenness().is_empty());
        assert!(graph.key_chunks(3).is_empty());
    }
}
