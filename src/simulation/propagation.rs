//! Radio propagation loss and delay models.
//!
//! Contains:
//! - The `PropagationLossModel` trait and its chainable implementations
//!   (Friis, three-log-distance, Nakagami fading, constant, matrix override, building walls)
//! - `build_chain`, which links an ordered list of model descriptions tail-first
//! - Propagation delay models (constant speed, zero)
//! - Deterministic free-space range estimate for logging
//!
//! Units:
//! - Power: dBm, loss: dB
//! - Distance: meters, frequency: Hz
//!
//! Chained models hold a shared `Rc` to the next model and never mutate it. Stochastic models
//! draw from the random stream handed in by the caller, so a seeded channel is reproducible.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::rc::Rc;

use super::geometry::{BuildingBounds, walls_crossed};
use super::types::{NodeId, Position, SPEED_OF_LIGHT, SimTime};
use crate::error::SimError;

/// One end of a radio link at the instant of transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkEnd {
    pub node: NodeId,
    pub position: Position,
}

/// Shared handle to the rest of a chain.
pub type ModelRef = Rc<dyn PropagationLossModel>;

/// Loss between two link ends. Implementations add the loss of their `next` model.
pub trait PropagationLossModel {
    /// Loss in dB for a transmission from `tx` to `rx` at `frequency_hz`.
    fn compute_loss(&self, tx: &LinkEnd, rx: &LinkEnd, frequency_hz: f64, rng: &mut StdRng) -> f64;

    fn name(&self) -> &'static str;
}

fn next_loss(next: &Option<ModelRef>, tx: &LinkEnd, rx: &LinkEnd, frequency_hz: f64, rng: &mut StdRng) -> f64 {
    next.as_ref().map_or(0.0, |model| model.compute_loss(tx, rx, frequency_hz, rng))
}

// ---------- Friis ----------

/// Parameters of the free-space (Friis) model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FriisParameters {
    /// Lower bound on the returned loss (dB).
    pub min_loss_db: f64,
    /// Additional system loss (dB), 0 for an ideal system.
    pub system_loss_db: f64,
    pub tx_gain_dbi: f64,
    pub rx_gain_dbi: f64,
}

impl Default for FriisParameters {
    fn default() -> Self {
        FriisParameters {
            min_loss_db: 0.0,
            system_loss_db: 0.0,
            tx_gain_dbi: 0.0,
            rx_gain_dbi: 0.0,
        }
    }
}

/// Free-space path loss.
///
/// # Formula
///
/// ```text
/// L(d) = 20·log₁₀(d) + 20·log₁₀(f) + 20·log₁₀(4π/c) + L_sys − G_tx − G_rx
/// ```
///
/// The result is floored at `min_loss_db`; a zero distance returns the floor.
pub struct FriisModel {
    params: FriisParameters,
    next: Option<ModelRef>,
}

impl FriisModel {
    pub fn new(params: FriisParameters) -> Self {
        FriisModel { params, next: None }
    }

    pub fn with_next(mut self, next: ModelRef) -> Self {
        self.next = Some(next);
        self
    }

    fn own_loss(&self, distance: f64, frequency_hz: f64) -> f64 {
        if distance <= 0.0 {
            return self.params.min_loss_db;
        }
        let fspl = 20.0 * distance.log10() + 20.0 * frequency_hz.log10() + 20.0 * (4.0 * PI / SPEED_OF_LIGHT).log10();
        let loss = fspl + self.params.system_loss_db - self.params.tx_gain_dbi - self.params.rx_gain_dbi;
        loss.max(self.params.min_loss_db)
    }
}

impl PropagationLossModel for FriisModel {
    fn compute_loss(&self, tx: &LinkEnd, rx: &LinkEnd, frequency_hz: f64, rng: &mut StdRng) -> f64 {
        let distance = tx.position.distance_to(&rx.position);
        self.own_loss(distance, frequency_hz) + next_loss(&self.next, tx, rx, frequency_hz, rng)
    }

    fn name(&self) -> &'static str {
        "friis"
    }
}

// ---------- Three-log-distance ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeLogDistanceParameters {
    pub distance0: f64,
    pub distance1: f64,
    pub distance2: f64,
    pub exponent0: f64,
    pub exponent1: f64,
    pub exponent2: f64,
    pub reference_loss_db: f64,
}

impl Default for ThreeLogDistanceParameters {
    fn default() -> Self {
        ThreeLogDistanceParameters {
            distance0: 1.0,
            distance1: 200.0,
            distance2: 500.0,
            exponent0: 1.9,
            exponent1: 3.8,
            exponent2: 3.8,
            reference_loss_db: 46.6777,
        }
    }
}

/// Piecewise log-distance model with three slopes. Distances below `distance0` are lossless.
pub struct ThreeLogDistanceModel {
    params: ThreeLogDistanceParameters,
    next: Option<ModelRef>,
}

impl ThreeLogDistanceModel {
    pub fn new(params: ThreeLogDistanceParameters) -> Result<Self, SimError> {
        let p = &params;
        if !(p.distance0 > 0.0 && p.distance0 < p.distance1 && p.distance1 < p.distance2) {
            return Err(SimError::invalid_argument(format!(
                "three-log-distance requires 0 < d0 < d1 < d2, got {} / {} / {}",
                p.distance0, p.distance1, p.distance2
            )));
        }
        Ok(ThreeLogDistanceModel { params, next: None })
    }

    pub fn with_next(mut self, next: ModelRef) -> Self {
        self.next = Some(next);
        self
    }

    fn own_loss(&self, distance: f64) -> f64 {
        let p = &self.params;
        if distance < p.distance0 {
            return 0.0;
        }
        let segment0 = |d: f64| 10.0 * p.exponent0 * (d / p.distance0).log10();
        let segment1 = |d: f64| 10.0 * p.exponent1 * (d / p.distance1).log10();
        let segment2 = |d: f64| 10.0 * p.exponent2 * (d / p.distance2).log10();
        let slope_loss = if distance < p.distance1 {
            segment0(distance)
        } else if distance < p.distance2 {
            segment0(p.distance1) + segment1(distance)
        } else {
            segment0(p.distance1) + segment1(p.distance2) + segment2(distance)
        };
        p.reference_loss_db + slope_loss
    }
}

impl PropagationLossModel for ThreeLogDistanceModel {
    fn compute_loss(&self, tx: &LinkEnd, rx: &LinkEnd, frequency_hz: f64, rng: &mut StdRng) -> f64 {
        let distance = tx.position.distance_to(&rx.position);
        self.own_loss(distance) + next_loss(&self.next, tx, rx, frequency_hz, rng)
    }

    fn name(&self) -> &'static str {
        "three-log-distance"
    }
}

// ---------- Nakagami ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NakagamiParameters {
    pub distance1: f64,
    pub distance2: f64,
    pub m0: f64,
    pub m1: f64,
    pub m2: f64,
}

impl Default for NakagamiParameters {
    fn default() -> Self {
        NakagamiParameters {
            distance1: 80.0,
            distance2: 200.0,
            m0: 1.5,
            m1: 0.75,
            m2: 0.75,
        }
    }
}

/// Nakagami-m fast fading applied on top of the next model's loss.
///
/// The power gain `G ~ Gamma(m, 1/m)` has unit mean, so the fading averages out
/// in the linear domain. The shape `m` depends on the link distance.
pub struct NakagamiModel {
    params: NakagamiParameters,
    gamma0: Gamma<f64>,
    gamma1: Gamma<f64>,
    gamma2: Gamma<f64>,
    next: Option<ModelRef>,
}

impl NakagamiModel {
    pub fn new(params: NakagamiParameters) -> Result<Self, SimError> {
        let gamma = |m: f64| Gamma::new(m, 1.0 / m).map_err(|e| SimError::invalid_argument(format!("invalid Nakagami m {}: {}", m, e)));
        if params.distance1 > params.distance2 {
            return Err(SimError::invalid_argument(format!(
                "Nakagami distance1 {} must not exceed distance2 {}",
                params.distance1, params.distance2
            )));
        }
        Ok(NakagamiModel {
            gamma0: gamma(params.m0)?,
            gamma1: gamma(params.m1)?,
            gamma2: gamma(params.m2)?,
            params,
            next: None,
        })
    }

    pub fn with_next(mut self, next: ModelRef) -> Self {
        self.next = Some(next);
        self
    }

    fn fading_db(&self, distance: f64, rng: &mut StdRng) -> f64 {
        let gain = if distance < self.params.distance1 {
            self.gamma0.sample(rng)
        } else if distance < self.params.distance2 {
            self.gamma1.sample(rng)
        } else {
            self.gamma2.sample(rng)
        };
        10.0 * gain.max(f64::MIN_POSITIVE).log10()
    }
}

impl PropagationLossModel for NakagamiModel {
    fn compute_loss(&self, tx: &LinkEnd, rx: &LinkEnd, frequency_hz: f64, rng: &mut StdRng) -> f64 {
        let base = next_loss(&self.next, tx, rx, frequency_hz, rng);
        let distance = tx.position.distance_to(&rx.position);
        base - self.fading_db(distance, rng)
    }

    fn name(&self) -> &'static str {
        "nakagami"
    }
}

// ---------- Constant ----------

pub struct ConstantLossModel {
    loss_db: f64,
    next: Option<ModelRef>,
}

impl ConstantLossModel {
    pub fn new(loss_db: f64) -> Self {
        ConstantLossModel { loss_db, next: None }
    }

    pub fn with_next(mut self, next: ModelRef) -> Self {
        self.next = Some(next);
        self
    }
}

impl PropagationLossModel for ConstantLossModel {
    fn compute_loss(&self, tx: &LinkEnd, rx: &LinkEnd, frequency_hz: f64, rng: &mut StdRng) -> f64 {
        self.loss_db + next_loss(&self.next, tx, rx, frequency_hz, rng)
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}

// ---------- Matrix ----------

/// Per-link override entry as it appears in scene files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub tx: NodeId,
    pub rx: NodeId,
    pub loss_db: f64,
    #[serde(default = "default_symmetric")]
    pub symmetric: bool,
}

fn default_symmetric() -> bool {
    true
}

/// Explicit loss per ordered (tx, rx) node pair.
///
/// Pairs without an entry fall back to the next model, or to `default_loss_db`
/// when the matrix is the tail of the chain.
pub struct MatrixLossModel {
    default_loss_db: f64,
    losses: HashMap<(NodeId, NodeId), f64>,
    next: Option<ModelRef>,
}

impl MatrixLossModel {
    pub fn new(default_loss_db: f64) -> Self {
        MatrixLossModel {
            default_loss_db,
            losses: HashMap::new(),
            next: None,
        }
    }

    pub fn with_next(mut self, next: ModelRef) -> Self {
        self.next = Some(next);
        self
    }

    pub fn set_loss(&mut self, tx: NodeId, rx: NodeId, loss_db: f64, symmetric: bool) {
        self.losses.insert((tx, rx), loss_db);
        if symmetric {
            self.losses.insert((rx, tx), loss_db);
        }
    }
}

impl PropagationLossModel for MatrixLossModel {
    fn compute_loss(&self, tx: &LinkEnd, rx: &LinkEnd, frequency_hz: f64, rng: &mut StdRng) -> f64 {
        if let Some(loss) = self.losses.get(&(tx.node, rx.node)) {
            return *loss;
        }
        match &self.next {
            Some(next) => next.compute_loss(tx, rx, frequency_hz, rng),
            None => self.default_loss_db,
        }
    }

    fn name(&self) -> &'static str {
        "matrix"
    }
}

// ---------- Buildings ----------

/// External wall material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallType {
    Wood,
    ConcreteWithWindows,
    ConcreteWithoutWindows,
    StoneBlocks,
}

impl WallType {
    /// Penetration loss of one external wall (dB).
    pub fn loss_db(&self) -> f64 {
        match self {
            WallType::Wood => 4.0,
            WallType::ConcreteWithWindows => 7.0,
            WallType::ConcreteWithoutWindows => 15.0,
            WallType::StoneBlocks => 12.0,
        }
    }
}

/// A building as seen by the channel: a box and its wall material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    #[serde(flatten)]
    pub bounds: BuildingBounds,
    pub wall_type: WallType,
}

/// Adds the penetration loss of every external wall the straight path crosses.
pub struct BuildingLossModel {
    buildings: Vec<Building>,
    next: Option<ModelRef>,
}

impl BuildingLossModel {
    pub fn new(buildings: Vec<Building>) -> Self {
        BuildingLossModel { buildings, next: None }
    }

    pub fn with_next(mut self, next: ModelRef) -> Self {
        self.next = Some(next);
        self
    }

    fn wall_loss(&self, a: &Position, b: &Position) -> f64 {
        self.buildings
            .iter()
            .map(|building| walls_crossed(a, b, &building.bounds) as f64 * building.wall_type.loss_db())
            .sum()
    }
}

impl PropagationLossModel for BuildingLossModel {
    fn compute_loss(&self, tx: &LinkEnd, rx: &LinkEnd, frequency_hz: f64, rng: &mut StdRng) -> f64 {
        self.wall_loss(&tx.position, &rx.position) + next_loss(&self.next, tx, rx, frequency_hz, rng)
    }

    fn name(&self) -> &'static str {
        "buildings"
    }
}

// ---------- Chain construction ----------

/// Serializable description of one model in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum LossModelSpec {
    Friis(FriisParameters),
    ThreeLogDistance(ThreeLogDistanceParameters),
    Nakagami(NakagamiParameters),
    Constant { loss_db: f64 },
    Matrix {
        #[serde(default)]
        default_loss_db: f64,
        #[serde(default)]
        entries: Vec<MatrixEntry>,
    },
    Buildings { buildings: Vec<Building> },
}

/// Build a chain from an ordered list: element i's `next` is element i+1.
///
/// # Returns
///
/// The head of the chain, or `InvalidArgument` for an empty list or invalid parameters.
pub fn build_chain(specs: &[LossModelSpec]) -> Result<ModelRef, SimError> {
    let mut next: Option<ModelRef> = None;
    for spec in specs.iter().rev() {
        let model: ModelRef = match spec {
            LossModelSpec::Friis(params) => attach(FriisModel::new(params.clone()), next.take(), FriisModel::with_next),
            LossModelSpec::ThreeLogDistance(params) => attach(ThreeLogDistanceModel::new(params.clone())?, next.take(), ThreeLogDistanceModel::with_next),
            LossModelSpec::Nakagami(params) => attach(NakagamiModel::new(params.clone())?, next.take(), NakagamiModel::with_next),
            LossModelSpec::Constant { loss_db } => attach(ConstantLossModel::new(*loss_db), next.take(), ConstantLossModel::with_next),
            LossModelSpec::Matrix { default_loss_db, entries } => {
                let mut matrix = MatrixLossModel::new(*default_loss_db);
                for entry in entries {
                    matrix.set_loss(entry.tx, entry.rx, entry.loss_db, entry.symmetric);
                }
                attach(matrix, next.take(), MatrixLossModel::with_next)
            }
            LossModelSpec::Buildings { buildings } => attach(BuildingLossModel::new(buildings.clone()), next.take(), BuildingLossModel::with_next),
        };
        next = Some(model);
    }
    next.ok_or_else(|| SimError::invalid_argument("propagation chain must contain at least one model"))
}

fn attach<M: PropagationLossModel + 'static>(model: M, next: Option<ModelRef>, with_next: fn(M, ModelRef) -> M) -> ModelRef {
    match next {
        Some(next) => Rc::new(with_next(model, next)),
        None => Rc::new(model),
    }
}

/// Names of the models in a chain description, head first, joined by " -> ".
pub fn describe_chain(specs: &[LossModelSpec]) -> String {
    specs
        .iter()
        .map(|spec| match spec {
            LossModelSpec::Friis(_) => "friis",
            LossModelSpec::ThreeLogDistance(_) => "three-log-distance",
            LossModelSpec::Nakagami(_) => "nakagami",
            LossModelSpec::Constant { .. } => "constant",
            LossModelSpec::Matrix { .. } => "matrix",
            LossModelSpec::Buildings { .. } => "buildings",
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

// ---------- Delay ----------

/// Time a signal needs to travel between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PropagationDelayModel {
    ConstantSpeed { speed: f64 },
    Zero,
}

impl Default for PropagationDelayModel {
    fn default() -> Self {
        PropagationDelayModel::ConstantSpeed { speed: SPEED_OF_LIGHT }
    }
}

impl PropagationDelayModel {
    pub fn delay(&self, a: &Position, b: &Position) -> SimTime {
        match self {
            PropagationDelayModel::ConstantSpeed { speed } => SimTime::from_secs_f64(a.distance_to(b) / speed),
            PropagationDelayModel::Zero => SimTime::ZERO,
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        match self {
            PropagationDelayModel::ConstantSpeed { speed } if !(*speed > 0.0) => Err(SimError::invalid_argument(format!("propagation speed must be positive, got {}", speed))),
            _ => Ok(()),
        }
    }
}

/// Estimate the free-space range at which received power equals the sensitivity.
///
/// Solving `P_tx − 20·log₁₀(4π·d·f/c) = S` for `d`:
///
/// ```text
/// d = c / (4π·f) · 10^((P_tx − S) / 20)
/// ```
///
/// Deterministic and gain-free; used only for logging the expected link reach.
pub fn free_space_range(tx_power_dbm: f64, sensitivity_dbm: f64, frequency_hz: f64) -> f64 {
    if frequency_hz <= 0.0 {
        return 0.0;
    }
    SPEED_OF_LIGHT / (4.0 * PI * frequency_hz) * 10f64.powf((tx_power_dbm - sensitivity_dbm) / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::geometry::Rectangle;
    use rand::SeedableRng;

    const WIFI_FREQ: f64 = 2.4e9;

    fn end(node: NodeId, x: f64) -> LinkEnd {
        LinkEnd {
            node,
            position: Position::new(x, 0.0, 0.0),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn friis_zero_distance_returns_floor() {
        let model = FriisModel::new(FriisParameters {
            min_loss_db: 3.0,
            ..Default::default()
        });
        assert_eq!(model.compute_loss(&end(0, 0.0), &end(1, 0.0), WIFI_FREQ, &mut rng()), 3.0);
    }

    #[test]
    fn friis_matches_free_space_formula() {
        let model = FriisModel::new(FriisParameters::default());
        let loss = model.compute_loss(&end(0, 0.0), &end(1, 500.0), WIFI_FREQ, &mut rng());
        // 20·log10(4π·500·2.4e9 / c) ≈ 94.02 dB
        assert!((loss - 94.02).abs() < 0.05, "loss {}", loss);

        let with_gains = FriisModel::new(FriisParameters {
            tx_gain_dbi: 2.0,
            rx_gain_dbi: 3.0,
            ..Default::default()
        });
        let loss_gain = with_gains.compute_loss(&end(0, 0.0), &end(1, 500.0), WIFI_FREQ, &mut rng());
        assert!((loss - loss_gain - 5.0).abs() < 1e-9);
    }

    #[test]
    fn three_log_distance_segments() {
        let model = ThreeLogDistanceModel::new(ThreeLogDistanceParameters::default()).unwrap();
        let mut r = rng();
        assert_eq!(model.compute_loss(&end(0, 0.0), &end(1, 0.5), WIFI_FREQ, &mut r), 0.0);
        let at_d1 = model.compute_loss(&end(0, 0.0), &end(1, 200.0), WIFI_FREQ, &mut r);
        assert!((at_d1 - (46.6777 + 19.0 * 200f64.log10())).abs() < 1e-9);
        let at_d2 = model.compute_loss(&end(0, 0.0), &end(1, 500.0), WIFI_FREQ, &mut r);
        assert!((at_d2 - (at_d1 + 38.0 * 2.5f64.log10())).abs() < 1e-9);

        let bad = ThreeLogDistanceParameters {
            distance1: 600.0,
            ..Default::default()
        };
        assert!(ThreeLogDistanceModel::new(bad).is_err());
    }

    #[test]
    fn nakagami_over_friis_is_bounded_and_reproducible() {
        let specs = vec![
            LossModelSpec::Nakagami(NakagamiParameters::default()),
            LossModelSpec::Friis(FriisParameters {
                min_loss_db: 3.0,
                ..Default::default()
            }),
        ];
        let chain = build_chain(&specs).unwrap();
        let friis = FriisModel::new(FriisParameters {
            min_loss_db: 3.0,
            ..Default::default()
        });
        let (tx, rx) = (end(0, 0.0), end(1, 500.0));
        let base = friis.compute_loss(&tx, &rx, WIFI_FREQ, &mut rng());

        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let samples_a: Vec<f64> = (0..2000).map(|_| chain.compute_loss(&tx, &rx, WIFI_FREQ, &mut a)).collect();
        let samples_b: Vec<f64> = (0..2000).map(|_| chain.compute_loss(&tx, &rx, WIFI_FREQ, &mut b)).collect();
        assert_eq!(samples_a, samples_b);

        // Gamma(0.75, 1/0.75) gains above ~20 are vanishingly rare, so the excursion below Friis stays small.
        assert!(samples_a.iter().all(|l| *l >= base - 15.0));
        let mean_gain: f64 = samples_a.iter().map(|l| 10f64.powf((base - l) / 10.0)).sum::<f64>() / samples_a.len() as f64;
        assert!((mean_gain - 1.0).abs() < 0.15, "mean gain {}", mean_gain);
    }

    #[test]
    fn invalid_nakagami_shape_is_rejected() {
        let params = NakagamiParameters {
            m0: 0.0,
            ..Default::default()
        };
        assert!(NakagamiModel::new(params).is_err());
    }

    #[test]
    fn matrix_override_and_fallback() {
        let mut matrix = MatrixLossModel::new(200.0);
        matrix.set_loss(0, 1, 50.0, false);
        let mut r = rng();
        assert_eq!(matrix.compute_loss(&end(0, 0.0), &end(1, 10.0), WIFI_FREQ, &mut r), 50.0);
        assert_eq!(matrix.compute_loss(&end(1, 10.0), &end(0, 0.0), WIFI_FREQ, &mut r), 200.0);

        let chained = MatrixLossModel::new(200.0).with_next(Rc::new(ConstantLossModel::new(80.0)));
        assert_eq!(chained.compute_loss(&end(1, 10.0), &end(0, 0.0), WIFI_FREQ, &mut r), 80.0);
    }

    #[test]
    fn buildings_add_wall_loss_on_top_of_next() {
        let building = Building {
            bounds: BuildingBounds {
                footprint: Rectangle::new(10.0, 20.0, -5.0, 5.0),
                z_min: 0.0,
                z_max: 30.0,
            },
            wall_type: WallType::ConcreteWithWindows,
        };
        let model = BuildingLossModel::new(vec![building]).with_next(Rc::new(ConstantLossModel::new(60.0)));
        let mut r = rng();
        assert_eq!(model.compute_loss(&end(0, 0.0), &end(1, 50.0), WIFI_FREQ, &mut r), 74.0);
        assert_eq!(model.compute_loss(&end(0, 15.0), &end(1, 50.0), WIFI_FREQ, &mut r), 67.0);
        assert_eq!(model.compute_loss(&end(0, 30.0), &end(1, 50.0), WIFI_FREQ, &mut r), 60.0);
    }

    #[test]
    fn chain_order_follows_list_and_empty_is_rejected() {
        let specs = vec![LossModelSpec::Constant { loss_db: 10.0 }, LossModelSpec::Constant { loss_db: 5.0 }];
        let chain = build_chain(&specs).unwrap();
        assert_eq!(chain.name(), "constant");
        assert_eq!(chain.compute_loss(&end(0, 0.0), &end(1, 1.0), WIFI_FREQ, &mut rng()), 15.0);
        assert_eq!(describe_chain(&specs), "constant -> constant");
        assert!(build_chain(&[]).is_err());
    }

    #[test]
    fn chain_spec_parses_from_json() {
        let json = r#"[{"model": "nakagami"}, {"model": "friis", "min_loss_db": 3.0}]"#;
        let specs: Vec<LossModelSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(describe_chain(&specs), "nakagami -> friis");
        assert!(build_chain(&specs).is_ok());
    }

    #[test]
    fn delay_models() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(SPEED_OF_LIGHT, 0.0, 0.0);
        assert_eq!(PropagationDelayModel::default().delay(&a, &b), SimTime::from_secs(1));
        assert_eq!(PropagationDelayModel::Zero.delay(&a, &b), SimTime::ZERO);
        assert!(PropagationDelayModel::ConstantSpeed { speed: 0.0 }.validate().is_err());
    }

    #[test]
    fn free_space_range_monotonic_with_tx_power() {
        let low = free_space_range(0.0, -96.0, WIFI_FREQ);
        let high = free_space_range(16.0, -96.0, WIFI_FREQ);
        assert!(low < high);
        assert!(high > 500.0);
    }
}
