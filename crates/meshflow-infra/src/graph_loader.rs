//! Planner graph document loader.

use std::path::{Path, PathBuf};

use meshflow_types::graph::{CandidateGraph, GraphParseError};

#[derive(Debug, thiserror::Error)]
pub enum GraphLoadError {
    #[error("failed to read graph {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: GraphParseError,
    },
}

/// Read and parse a planner JSON document. The graph is still untrusted.
pub async fn load_graph_file(path: &Path) -> Result<CandidateGraph, GraphLoadError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| GraphLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    CandidateGraph::from_json(&content).map_err(|source| GraphLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn load_graph_file_parses_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("graph.json");
        tokio::fs::write(
            &path,
            r#"{"nodes": [{"id": "fetch", "service": "user-fetch"}]}"#,
        )
        .await
        .unwrap();

        let graph = load_graph_file(&path).await.unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].service, "user-fetch");
    }

    #[tokio::test]
    async fn load_graph_file_reports_parse_errors_with_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let err = load_graph_file(&path).await.unwrap_err();
        assert!(matches!(err, GraphLoadError::Parse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn load_graph_file_missing() {
        let tmp = TempDir::new().unwrap();
        let err = load_graph_file(&tmp.path().join("nope.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphLoadError::Io { .. }));
    }
}
