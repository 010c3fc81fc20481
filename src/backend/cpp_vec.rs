//! Printing cluster bodies with the runtime's SIMD vector type.
//!
//! Domain dimensions are addressed in vector units inside the cluster
//! function (`xv` is the vector index of the cluster origin along `x`) and
//! in elements where single values are read (`x = xv * VLEN_X`).

use std::collections::BTreeMap;

use hashbrown::HashMap;
use itertools::Itertools;

use super::{
    print_helper::{element_args, PrintHelper, VarNames},
    writer::CodeWriter,
};
use crate::{
    frontend::{
        ast::format_dim_offset,
        dims::Dim,
        grid::{GridPoint, PointKey},
    },
    middle::{
        dims::Dimensions,
        shuffle::ShuffleOp,
        vec_info::{ReadClass, VecInfo},
    },
};

/// One argument in vector units, e.g. `xv`, `xv+1` or `xv-2`
fn format_vec_offset(dim: Dim, vectors: i64) -> String {
    match vectors {
        0 => format!("{}v", dim.name()),
        v if v > 0 => format!("{}v+{v}", dim.name()),
        v => format!("{}v{v}", dim.name()),
    }
}

/// Arguments addressing the aligned vector at `point`
pub fn vector_args(dims: &Dimensions, point: &GridPoint) -> String {
    point
        .grid()
        .dims()
        .iter()
        .zip(point.resolved_offsets())
        .map(|(dim, offset)| {
            if dim.is_domain() {
                let fold = dims.fold_of(*dim) as i64;
                format_vec_offset(*dim, offset.div_euclid(fold))
            } else {
                format_dim_offset(*dim, *offset)
            }
        })
        .join(", ")
}

fn format_mask(mask: u64) -> String {
    format!("0x{mask:x}")
}

pub struct CppVecPrintHelper<'a> {
    dims: &'a Dimensions,
    info: &'a VecInfo<'a>,
    names: VarNames,
    /// Variables already holding a vector, by the point they hold
    loaded: HashMap<PointKey, String>,
    /// Base pointer variables by base point
    pointers: BTreeMap<PointKey, String>,
}

impl<'a> CppVecPrintHelper<'a> {
    pub fn new(dims: &'a Dimensions, info: &'a VecInfo<'a>) -> Self {
        let pointers = info
            .pointers
            .keys()
            .enumerate()
            .map(|(index, key)| (key.clone(), format!("ptr_{index}")))
            .collect();

        Self {
            dims,
            info,
            names: VarNames::default(),
            loaded: HashMap::new(),
            pointers,
        }
    }

    /// Declares every base pointer, once, ahead of the body
    pub fn print_base_pointers(&self, writer: &mut CodeWriter) {
        for (key, (base, window)) in &self.info.pointers {
            let name = &self.pointers[key];

            if let Some(inner) = self.dims.inner_dim() {
                writer.comment(format!(
                    "{name} serves {} from {} to {}",
                    strip_ansi_escapes::strip_str(base.to_string()),
                    format_dim_offset(inner, window.lo),
                    format_dim_offset(inner, window.hi),
                ));
            }

            writer.emit(format!(
                "real_vec_t* {name} = context.{}->get_vec_ptr_norm({});",
                base.grid().name(),
                vector_args(self.dims, base)
            ));
        }
    }

    /// Emits prefetches of the given inner dimension offsets
    pub fn print_prefetches(&self, writer: &mut CodeWriter, offsets: &[(GridPoint, Vec<i64>)]) {
        for (base, offsets) in offsets {
            let name = &self.pointers[&base.key()];
            let fold = self.inner_fold();

            for offset in offsets {
                writer.emit(format!("prefetch<level>(&{name}[{}]);", offset.div_euclid(fold)));
            }
        }
    }

    fn inner_fold(&self) -> i64 {
        self.dims
            .inner_dim()
            .map_or(1, |inner| self.dims.fold_of(inner) as i64)
    }

    /// The pointer and vector index an aligned read goes through, if its
    /// grid has the inner dimension
    fn pointer_for(&self, point: &GridPoint) -> Option<(&str, i64)> {
        let inner = self.dims.inner_dim().filter(|d| point.grid().has_dim(*d))?;
        let offset = point.offset_of(inner)?;
        let base = point.translated(&[(inner, -offset)]);
        let name = self.pointers.get(&base.key())?;

        Some((name.as_str(), offset.div_euclid(self.inner_fold())))
    }

    fn load_aligned(&mut self, writer: &mut CodeWriter, point: &GridPoint) -> String {
        if let Some(var) = self.loaded.get(&point.key()) {
            return var.clone();
        }

        let source = match self.pointer_for(point) {
            Some((pointer, index)) => format!("{pointer}[{index}]"),
            None => format!(
                "context.{}->read_vec_norm({})",
                point.grid().name(),
                vector_args(self.dims, point)
            ),
        };

        let var = self.names.make("vec");
        writer.emit(format!("real_vec_t {var} = {source};"));
        self.loaded.insert(point.key(), var.clone());
        var
    }

    fn load_block(&mut self, writer: &mut CodeWriter, point: &GridPoint, block: &PointKey) -> String {
        let aligned = GridPoint::with_offsets(point.grid().clone(), block.offsets.clone());
        self.load_aligned(writer, &aligned)
    }

    fn print_element(&self, writer: &mut CodeWriter, var: &str, lane: usize, element: &GridPoint) {
        writer.emit(format!(
            "{var}[{lane}] = context.{}->read_elem({});",
            element.grid().name(),
            element_args(element)
        ));
    }

    fn print_shuffles(&mut self, writer: &mut CodeWriter, point: &GridPoint, ops: &[ShuffleOp]) -> String {
        // Sources first so the assembly below reads as one block
        let sources: Vec<Vec<String>> = ops
            .iter()
            .map(|op| {
                op.blocks()
                    .into_iter()
                    .map(|block| self.load_block(writer, point, block))
                    .collect()
            })
            .collect();

        let var = self.names.make("vec");
        writer.comment(format!(
            "{} from {} operation(s)",
            strip_ansi_escapes::strip_str(point.to_string()),
            ops.len()
        ));
        writer.emit(format!("real_vec_t {var};"));

        for (op, sources) in ops.iter().zip(sources) {
            match op {
                ShuffleOp::Align { count, mask, .. } => {
                    let (upper, lower) = (&sources[0], &sources[1]);
                    match mask {
                        Some(mask) => writer.emit(format!(
                            "real_vec_align_masked<{count}>({var}, {upper}, {lower}, {});",
                            format_mask(*mask)
                        )),
                        None => writer.emit(format!("real_vec_align<{count}>({var}, {upper}, {lower});")),
                    }
                }
                ShuffleOp::Permute { ctrl, mask, .. } => {
                    let ctrl_var = self.names.make("ctrl");
                    let lanes = ctrl.iter().map(|c| c.unwrap_or(0)).join(", ");
                    writer.emit(format!("const real_vec_permute_t {ctrl_var} = {{ {lanes} }};"));

                    let source = &sources[0];
                    match mask {
                        Some(mask) => writer.emit(format!(
                            "real_vec_permute_masked({var}, {ctrl_var}, {source}, {});",
                            format_mask(*mask)
                        )),
                        None => writer.emit(format!("real_vec_permute({var}, {ctrl_var}, {source});")),
                    }
                }
                ShuffleOp::Permute2 { ctrl, .. } => {
                    let ctrl_var = self.names.make("ctrl");
                    let lanes = ctrl
                        .iter()
                        .map(|c| match c {
                            Some((true, lane)) => format!("ctrl_sel_bit | {lane}"),
                            Some((false, lane)) => lane.to_string(),
                            None => String::from("0"),
                        })
                        .join(", ");
                    writer.emit(format!("const real_vec_permute_t {ctrl_var} = {{ {lanes} }};"));
                    writer.emit(format!(
                        "real_vec_permute2({var}, {ctrl_var}, {}, {});",
                        sources[0], sources[1]
                    ));
                }
                ShuffleOp::Element { lane, element } => self.print_element(writer, &var, *lane, element),
            }
        }

        var
    }

    fn print_gather(&mut self, writer: &mut CodeWriter, elements: &[GridPoint]) -> String {
        let var = self.names.make("vec");
        writer.emit(format!("real_vec_t {var};"));

        for (lane, element) in elements.iter().enumerate() {
            self.print_element(writer, &var, lane, element);
        }

        var
    }
}

impl PrintHelper for CppVecPrintHelper<'_> {
    fn var_type(&self) -> &'static str {
        "real_vec_t"
    }

    fn make_var_name(&mut self, prefix: &str) -> String {
        self.names.make(prefix)
    }

    fn read_from_point(&mut self, writer: &mut CodeWriter, point: &GridPoint) -> String {
        let key = point.key();

        if let Some(var) = self.loaded.get(&key) {
            return var.clone();
        }

        let var = match self.info.class_of(point).cloned() {
            Some(ReadClass::Aligned) => return self.load_aligned(writer, point),
            Some(ReadClass::UnalignedLoad) => {
                let var = self.names.make("vec");
                writer.emit(format!(
                    "real_vec_t {var} = context.{}->read_vec_unaligned({});",
                    point.grid().name(),
                    element_args(point)
                ));
                var
            }
            Some(ReadClass::Unaligned(ops)) => self.print_shuffles(writer, point, &ops),
            Some(ReadClass::Gathered(elements)) => self.print_gather(writer, &elements),
            Some(ReadClass::Broadcast) => {
                let var = self.names.make("vec");
                writer.emit(format!(
                    "real_vec_t {var}(context.{}->read_elem({}));",
                    point.grid().name(),
                    element_args(point)
                ));
                var
            }
            // Not seen by the analysis: fall back to reading every lane
            None => {
                let elements: Vec<GridPoint> = self
                    .info
                    .lane_sources(point)
                    .into_iter()
                    .map(|source| source.element)
                    .collect();
                self.print_gather(writer, &elements)
            }
        };

        self.loaded.insert(key, var.clone());
        var
    }

    fn write_to_point(&mut self, writer: &mut CodeWriter, point: &GridPoint, value: &str) {
        writer.emit(format!(
            "context.{}->write_vec_norm({value}, {});",
            point.grid().name(),
            vector_args(self.dims, point)
        ));
    }
}
