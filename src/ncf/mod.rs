use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Errors loading or validating the frozen model asset
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("model asset not found: {0}")]
    Missing(String),

    #[error("failed to read model asset: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model asset: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("inconsistent model weights: {0}")]
    Shape(String),
}

/// One of the two embedding pathways of the frozen model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tower {
    /// Multiplicative path: user and item embeddings combined element-wise
    Gmf,
    /// Deep path: user and item embeddings concatenated through dense layers
    Mlp,
}

/// Bidirectional external-id ↔ dense-index table: an array of canonical
/// ids plus a reverse lookup map.
///
/// The model builds one per id universe at asset load and never mutates it
/// again; the neighbor engine grows one per request by interning ids as
/// they appear. Lookups for unknown ids return `None`.
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    ids: Vec<i64>,
    index: HashMap<i64, usize>,
}

impl IdIndex {
    pub fn new(ids: Vec<i64>) -> Self {
        let index = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Self { ids, index }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Interns an id, appending it to the arena on first sight
    pub fn intern(&mut self, id: i64) -> usize {
        *self.index.entry(id).or_insert_with(|| {
            self.ids.push(id);
            self.ids.len() - 1
        })
    }

    pub fn index_of(&self, id: i64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn id_at(&self, index: usize) -> i64 {
        self.ids[index]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One dense layer as persisted in the asset: row-major `weights[in][out]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
}

/// Serialized form of the frozen NeuMF asset.
///
/// The persisted layout is fixed: two embedding tables per tower plus the
/// scoring network (two hidden dense layers and one output layer). Topology
/// is carried explicitly so weight shapes can be validated instead of
/// assumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAsset {
    /// Width of the GMF embeddings
    pub n_factors: usize,
    /// Width of the MLP embeddings
    pub mlp_embed_dim: usize,
    /// Canonical user ids, positionally aligned with the user tables
    pub user_ids: Vec<i64>,
    /// Canonical item ids, positionally aligned with the item tables
    pub item_ids: Vec<i64>,
    pub gmf_user_embeddings: Vec<Vec<f64>>,
    pub gmf_item_embeddings: Vec<Vec<f64>>,
    pub mlp_user_embeddings: Vec<Vec<f64>>,
    pub mlp_item_embeddings: Vec<Vec<f64>>,
    /// The two hidden dense layers of the MLP path
    pub hidden_layers: Vec<DenseLayer>,
    /// Final linear layer over concat(gmf, mlp) — no bias in the asset
    pub output_weights: Vec<f64>,
}

/// The frozen scoring network, validated against the declared topology
pub struct ScoringNetwork {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
    w_out: Array1<f64>,
}

impl ScoringNetwork {
    fn from_asset(asset: &ModelAsset) -> Result<Self, ModelError> {
        if asset.hidden_layers.len() != 2 {
            return Err(ModelError::Shape(format!(
                "expected 2 hidden layers, found {}",
                asset.hidden_layers.len()
            )));
        }

        let w1 = dense_matrix(&asset.hidden_layers[0], "hidden layer 1")?;
        let b1 = Array1::from_vec(asset.hidden_layers[0].biases.clone());
        let w2 = dense_matrix(&asset.hidden_layers[1], "hidden layer 2")?;
        let b2 = Array1::from_vec(asset.hidden_layers[1].biases.clone());
        let w_out = Array1::from_vec(asset.output_weights.clone());

        if w1.nrows() != 2 * asset.mlp_embed_dim {
            return Err(ModelError::Shape(format!(
                "hidden layer 1 expects {} inputs, model concatenates {}",
                w1.nrows(),
                2 * asset.mlp_embed_dim
            )));
        }
        if w1.ncols() != b1.len() {
            return Err(ModelError::Shape(
                "hidden layer 1 bias width does not match its weights".to_string(),
            ));
        }
        if w2.nrows() != w1.ncols() {
            return Err(ModelError::Shape(
                "hidden layer 2 does not accept hidden layer 1 outputs".to_string(),
            ));
        }
        if w2.ncols() != b2.len() {
            return Err(ModelError::Shape(
                "hidden layer 2 bias width does not match its weights".to_string(),
            ));
        }
        if w_out.len() != asset.n_factors + w2.ncols() {
            return Err(ModelError::Shape(format!(
                "output layer expects {} inputs, paths produce {}",
                w_out.len(),
                asset.n_factors + w2.ncols()
            )));
        }

        Ok(Self {
            w1,
            b1,
            w2,
            b2,
            w_out,
        })
    }

    /// Forward-evaluates one (user, item) pair: element-wise product on the
    /// GMF path, concat + two dense+ReLU layers on the MLP path, both paths
    /// concatenated into the final linear layer and squashed by a sigmoid.
    pub fn forward(
        &self,
        user_gmf: ArrayView1<f64>,
        item_gmf: ArrayView1<f64>,
        user_mlp: ArrayView1<f64>,
        item_mlp: ArrayView1<f64>,
    ) -> f64 {
        let gmf = &user_gmf * &item_gmf;

        let mlp_in = Array1::from_iter(user_mlp.iter().chain(item_mlp.iter()).copied());
        let h1 = (mlp_in.dot(&self.w1) + &self.b1).mapv(|v| v.max(0.0));
        let h2 = (h1.dot(&self.w2) + &self.b2).mapv(|v| v.max(0.0));

        let combined = Array1::from_iter(gmf.iter().chain(h2.iter()).copied());
        let logit = combined.dot(&self.w_out);
        1.0 / (1.0 + (-logit).exp())
    }
}

/// A synthesized cold-start user representation, one vector per tower
#[derive(Debug, Clone, PartialEq)]
pub struct UserEmbedding {
    pub gmf: Array1<f64>,
    pub mlp: Array1<f64>,
}

/// The loaded, immutable NeuMF model: id tables, embedding towers and the
/// (possibly unavailable) scoring network.
pub struct NcfModel {
    users: IdIndex,
    items: IdIndex,
    gmf_user: Array2<f64>,
    gmf_item: Array2<f64>,
    mlp_user: Array2<f64>,
    mlp_item: Array2<f64>,
    network: Option<ScoringNetwork>,
    n_factors: usize,
    mlp_embed_dim: usize,
}

impl NcfModel {
    /// Loads and validates the asset from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::Missing(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let asset: ModelAsset = serde_json::from_str(&contents)?;
        let model = Self::from_asset(asset)?;
        tracing::info!(
            users = model.users.len(),
            items = model.items.len(),
            n_factors = model.n_factors,
            mlp_embed_dim = model.mlp_embed_dim,
            scoring_network = model.network.is_some(),
            path = %path.display(),
            "model asset loaded"
        );
        Ok(model)
    }

    /// Builds the model from a parsed asset.
    ///
    /// Embedding tables must be consistent with the id arrays and declared
    /// widths. A missing or inconsistent scoring network is tolerated — the
    /// batch scorer degrades to neutral scores — so only the embedding side
    /// is fatal here.
    pub fn from_asset(asset: ModelAsset) -> Result<Self, ModelError> {
        let gmf_user = embedding_table(
            &asset.gmf_user_embeddings,
            asset.user_ids.len(),
            asset.n_factors,
            "gmf user",
        )?;
        let gmf_item = embedding_table(
            &asset.gmf_item_embeddings,
            asset.item_ids.len(),
            asset.n_factors,
            "gmf item",
        )?;
        let mlp_user = embedding_table(
            &asset.mlp_user_embeddings,
            asset.user_ids.len(),
            asset.mlp_embed_dim,
            "mlp user",
        )?;
        let mlp_item = embedding_table(
            &asset.mlp_item_embeddings,
            asset.item_ids.len(),
            asset.mlp_embed_dim,
            "mlp item",
        )?;

        let network = match ScoringNetwork::from_asset(&asset) {
            Ok(network) => Some(network),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "scoring network unavailable; batch scoring degrades to neutral scores"
                );
                None
            }
        };

        Ok(Self {
            users: IdIndex::new(asset.user_ids),
            items: IdIndex::new(asset.item_ids),
            gmf_user,
            gmf_item,
            mlp_user,
            mlp_item,
            network,
            n_factors: asset.n_factors,
            mlp_embed_dim: asset.mlp_embed_dim,
        })
    }

    /// Internal index for an external user id, if the model knows the user
    pub fn user_index(&self, user_id: i64) -> Option<usize> {
        self.users.index_of(user_id)
    }

    /// Internal index for an external item id, if the model knows the item
    pub fn item_index(&self, item_id: i64) -> Option<usize> {
        self.items.index_of(item_id)
    }

    pub fn embed_user(&self, tower: Tower, index: usize) -> ArrayView1<f64> {
        match tower {
            Tower::Gmf => self.gmf_user.row(index),
            Tower::Mlp => self.mlp_user.row(index),
        }
    }

    pub fn embed_item(&self, tower: Tower, index: usize) -> ArrayView1<f64> {
        match tower {
            Tower::Gmf => self.gmf_item.row(index),
            Tower::Mlp => self.mlp_item.row(index),
        }
    }

    /// The frozen scoring network, or `None` when the asset's network
    /// weights were missing or inconsistent
    pub fn scoring_network(&self) -> Option<&ScoringNetwork> {
        self.network.as_ref()
    }

    pub fn n_factors(&self) -> usize {
        self.n_factors
    }

    pub fn mlp_embed_dim(&self) -> usize {
        self.mlp_embed_dim
    }
}

fn embedding_table(
    rows: &[Vec<f64>],
    expected_rows: usize,
    width: usize,
    name: &str,
) -> Result<Array2<f64>, ModelError> {
    if rows.len() != expected_rows {
        return Err(ModelError::Shape(format!(
            "{name} table has {} rows for {} ids",
            rows.len(),
            expected_rows
        )));
    }
    let mut flat = Vec::with_capacity(rows.len() * width);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(ModelError::Shape(format!(
                "{name} table row {i} has width {}, expected {width}",
                row.len()
            )));
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((expected_rows, width), flat)
        .map_err(|e| ModelError::Shape(format!("{name} table: {e}")))
}

fn dense_matrix(layer: &DenseLayer, name: &str) -> Result<Array2<f64>, ModelError> {
    let rows = layer.weights.len();
    if rows == 0 {
        return Err(ModelError::Shape(format!("{name} has no weights")));
    }
    let cols = layer.weights[0].len();
    embedding_table(&layer.weights, rows, cols, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-factor model with hand-checkable weights
    fn tiny_asset() -> ModelAsset {
        ModelAsset {
            n_factors: 1,
            mlp_embed_dim: 1,
            user_ids: vec![7],
            item_ids: vec![42, 43],
            gmf_user_embeddings: vec![vec![2.0]],
            gmf_item_embeddings: vec![vec![3.0], vec![0.0]],
            mlp_user_embeddings: vec![vec![1.0]],
            mlp_item_embeddings: vec![vec![1.0], vec![0.0]],
            hidden_layers: vec![
                DenseLayer {
                    weights: vec![vec![1.0], vec![1.0]],
                    biases: vec![0.0],
                },
                DenseLayer {
                    weights: vec![vec![0.5]],
                    biases: vec![0.0],
                },
            ],
            output_weights: vec![1.0, 2.0],
        }
    }

    #[test]
    fn test_id_index_bidirectional() {
        let index = IdIndex::new(vec![10, 20, 30]);
        assert_eq!(index.index_of(20), Some(1));
        assert_eq!(index.index_of(99), None);
        assert_eq!(index.id_at(2), 30);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_id_index_interning() {
        let mut index = IdIndex::empty();
        assert_eq!(index.intern(40), 0);
        assert_eq!(index.intern(50), 1);
        assert_eq!(index.intern(40), 0);
        assert_eq!(index.id_at(1), 50);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_forward_hand_computed() {
        // gmf = 2*3 = 6; mlp: [1,1] -> relu(2) -> relu(1.0) = 1;
        // logit = 6*1 + 1*2 = 8
        let model = NcfModel::from_asset(tiny_asset()).unwrap();
        let network = model.scoring_network().unwrap();
        let score = network.forward(
            model.embed_user(Tower::Gmf, 0),
            model.embed_item(Tower::Gmf, 0),
            model.embed_user(Tower::Mlp, 0),
            model.embed_item(Tower::Mlp, 0),
        );
        let expected = 1.0 / (1.0 + (-8.0f64).exp());
        assert!((score - expected).abs() < 1e-12);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_embedding_table_mismatch_is_fatal() {
        let mut asset = tiny_asset();
        asset.gmf_item_embeddings.pop();
        assert!(matches!(
            NcfModel::from_asset(asset),
            Err(ModelError::Shape(_))
        ));
    }

    #[test]
    fn test_bad_network_degrades_instead_of_failing() {
        let mut asset = tiny_asset();
        asset.output_weights = vec![1.0];
        let model = NcfModel::from_asset(asset).unwrap();
        assert!(model.scoring_network().is_none());
        // Embedding lookups still work for the synthesizer
        assert_eq!(model.item_index(42), Some(0));
        assert_eq!(model.item_index(99), None);
    }

    #[test]
    fn test_asset_round_trip() {
        let json = serde_json::to_string(&tiny_asset()).unwrap();
        let parsed: ModelAsset = serde_json::from_str(&json).unwrap();
        let model = NcfModel::from_asset(parsed).unwrap();
        assert_eq!(model.n_factors(), 1);
        assert_eq!(model.user_index(7), Some(0));
    }
}
