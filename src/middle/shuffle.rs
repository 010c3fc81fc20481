//! Planning how to assemble an unaligned vector from aligned ones.
//!
//! Each lane of the wanted vector comes from some lane of an aligned
//! vector. The planner greedily picks the lane-rearranging operation that
//! produces the most still-missing lanes (align first, then single and
//! two-source permutes), until nothing more can be gained. Lanes no
//! operation produces are read one element at a time.
//!
//! Operation semantics for a vector width of `n`:
//!
//! * `Align { upper, lower, count }`: lane `i` is `lower[i + count]` when
//!   `i + count < n`, otherwise `upper[i + count - n]`.
//! * `Permute { source, ctrl }`: lane `i` is `source[ctrl[i]]`.
//! * `Permute2 { a, b, ctrl }`: lane `i` is `b[p]` when `ctrl[i]` selects
//!   the second source, otherwise `a[p]`.
//!
//! A masked operation writes only the lanes whose mask bit is set. An
//! unmasked one overwrites every lane.

use log::debug;

use crate::frontend::grid::{GridPoint, PointKey};

/// Where one lane of a wanted vector lives
#[derive(Debug, Clone)]
pub struct LaneSource {
    /// The aligned vector holding the element
    pub block: PointKey,
    /// The lane of `block` holding it
    pub lane: usize,
    /// The element itself, for element-wise assembly
    pub element: GridPoint,
}

/// What the target's lane-rearranging instructions can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShuffleCapability {
    pub shuffles: bool,
    pub masks: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShuffleOp {
    Align {
        upper: PointKey,
        lower: PointKey,
        count: usize,
        mask: Option<u64>,
    },
    Permute {
        source: PointKey,
        /// `None` marks a lane this operation does not provide
        ctrl: Vec<Option<usize>>,
        mask: Option<u64>,
    },
    Permute2 {
        a: PointKey,
        b: PointKey,
        /// `(true, p)` selects `b[p]`
        ctrl: Vec<Option<(bool, usize)>>,
    },
    Element {
        lane: usize,
        element: GridPoint,
    },
}

impl ShuffleOp {
    /// The aligned vectors this operation reads
    pub fn blocks(&self) -> Vec<&PointKey> {
        match self {
            ShuffleOp::Align { upper, lower, .. } => vec![upper, lower],
            ShuffleOp::Permute { source, .. } => vec![source],
            ShuffleOp::Permute2 { a, b, .. } => vec![a, b],
            ShuffleOp::Element { .. } => Vec::new(),
        }
    }
}

fn mask_of(lanes: &[usize]) -> u64 {
    lanes.iter().fold(0, |mask, lane| mask | (1u64 << lane))
}

/// A candidate operation and the missing lanes it would produce
struct Candidate {
    op: ShuffleOp,
    lanes: Vec<usize>,
}

fn distinct_blocks(sources: &[LaneSource]) -> Vec<&PointKey> {
    let mut blocks: Vec<&PointKey> = Vec::new();

    for source in sources {
        if !blocks.contains(&&source.block) {
            blocks.push(&source.block);
        }
    }

    blocks
}

fn best_align(sources: &[LaneSource], done: &[bool], blocks: &[&PointKey]) -> Option<Candidate> {
    let n = sources.len();
    let mut best: Option<Candidate> = None;

    for upper in blocks {
        for lower in blocks {
            for count in 1..n {
                let lanes: Vec<usize> = (0..n)
                    .filter(|i| !done[*i])
                    .filter(|i| {
                        let (block, lane) = if i + count < n {
                            (*lower, i + count)
                        } else {
                            (*upper, i + count - n)
                        };

                        sources[*i].block == *block && sources[*i].lane == lane
                    })
                    .collect();

                if best.as_ref().is_none_or(|b| lanes.len() > b.lanes.len()) {
                    best = Some(Candidate {
                        op: ShuffleOp::Align {
                            upper: (*upper).clone(),
                            lower: (*lower).clone(),
                            count,
                            mask: None,
                        },
                        lanes,
                    });
                }
            }
        }
    }

    best
}

fn best_permute(sources: &[LaneSource], done: &[bool], blocks: &[&PointKey]) -> Option<Candidate> {
    blocks
        .iter()
        .map(|block| {
            let ctrl: Vec<Option<usize>> = sources
                .iter()
                .zip(done)
                .map(|(source, done)| {
                    (!done && source.block == **block).then_some(source.lane)
                })
                .collect();

            Candidate {
                lanes: (0..ctrl.len()).filter(|i| ctrl[*i].is_some()).collect(),
                op: ShuffleOp::Permute {
                    source: (*block).clone(),
                    ctrl,
                    mask: None,
                },
            }
        })
        .reduce(|best, next| if next.lanes.len() > best.lanes.len() { next } else { best })
}

fn best_permute2(sources: &[LaneSource], blocks: &[&PointKey]) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;

    for (index, a) in blocks.iter().enumerate() {
        for b in &blocks[index + 1..] {
            let ctrl: Vec<Option<(bool, usize)>> = sources
                .iter()
                .map(|source| {
                    if source.block == **a {
                        Some((false, source.lane))
                    } else if source.block == **b {
                        Some((true, source.lane))
                    } else {
                        None
                    }
                })
                .collect();
            let lanes: Vec<usize> = (0..ctrl.len()).filter(|i| ctrl[*i].is_some()).collect();

            if best.as_ref().is_none_or(|b| lanes.len() > b.lanes.len()) {
                best = Some(Candidate {
                    op: ShuffleOp::Permute2 {
                        a: (*a).clone(),
                        b: (*b).clone(),
                        ctrl,
                    },
                    lanes,
                });
            }
        }
    }

    best
}

/// Plans the construction of the vector whose lane `i` is `sources[i]`
pub fn plan(sources: &[LaneSource], capability: ShuffleCapability) -> Vec<ShuffleOp> {
    let n = sources.len();
    let blocks = distinct_blocks(sources);
    let mut done = vec![false; n];
    let mut ops = Vec::new();

    while capability.shuffles && done.iter().any(|d| !d) {
        let any_done = done.iter().any(|d| *d);

        // Without masks a second operation would clobber the first
        if any_done && !capability.masks {
            break;
        }

        let mut candidates = vec![
            best_align(sources, &done, &blocks),
            best_permute(sources, &done, &blocks),
        ];

        // Two-source permutes cannot be masked
        if !any_done {
            candidates.push(best_permute2(sources, &blocks));
        }

        let Some(best) = candidates
            .into_iter()
            .flatten()
            .reduce(|best, next| if next.lanes.len() > best.lanes.len() { next } else { best })
        else {
            break;
        };

        if best.lanes.is_empty() {
            break;
        }

        let mask = any_done.then(|| mask_of(&best.lanes));
        let op = match best.op {
            ShuffleOp::Align {
                upper,
                lower,
                count,
                ..
            } => ShuffleOp::Align {
                upper,
                lower,
                count,
                mask,
            },
            ShuffleOp::Permute { source, ctrl, .. } => ShuffleOp::Permute { source, ctrl, mask },
            other => other,
        };

        for lane in &best.lanes {
            done[*lane] = true;
        }

        ops.push(op);
    }

    for (lane, source) in sources.iter().enumerate() {
        if !done[lane] {
            ops.push(ShuffleOp::Element {
                lane,
                element: source.element.clone(),
            });
        }
    }

    debug!(
        "{} lanes assembled with {} operations",
        n,
        ops.len()
    );

    ops
}

/// Runs a plan on concrete values, the way the generated code would
pub fn emulate<T: Copy + Default>(
    ops: &[ShuffleOp],
    width: usize,
    load: impl Fn(&PointKey) -> Vec<T>,
    read: impl Fn(&GridPoint) -> T,
) -> Vec<T> {
    let mut result = vec![T::default(); width];

    let write = |result: &mut Vec<T>, values: Vec<T>, mask: Option<u64>| {
        for (lane, value) in values.into_iter().enumerate() {
            if mask.is_none_or(|mask| mask & (1u64 << lane) != 0) {
                result[lane] = value;
            }
        }
    };

    for op in ops {
        match op {
            ShuffleOp::Align {
                upper,
                lower,
                count,
                mask,
            } => {
                let (upper, lower) = (load(upper), load(lower));
                let values = (0..width)
                    .map(|i| {
                        if i + count < width {
                            lower[i + count]
                        } else {
                            upper[i + count - width]
                        }
                    })
                    .collect();
                write(&mut result, values, *mask);
            }
            ShuffleOp::Permute { source, ctrl, mask } => {
                let source = load(source);
                let values = ctrl.iter().map(|p| source[p.unwrap_or(0)]).collect();
                write(&mut result, values, *mask);
            }
            ShuffleOp::Permute2 { a, b, ctrl } => {
                let (a, b) = (load(a), load(b));
                let values = ctrl
                    .iter()
                    .map(|c| match c {
                        Some((true, p)) => b[*p],
                        Some((false, p)) => a[*p],
                        None => a[0],
                    })
                    .collect();
                write(&mut result, values, None);
            }
            ShuffleOp::Element { lane, element } => result[*lane] = read(element),
        }
    }

    result
}
