//! Local mirror of the controller's object model
//!
//! Axes live in a fixed array since the controller never reports more than
//! [`MAX_TOTAL_AXES`]. Tools, spindles, beds and chambers are kept in
//! index-sorted vectors that grow as the controller reports new entries.

use crate::status::ToolStatus;
use serde::Serialize;

pub const MAX_TOTAL_AXES: usize = 10;

/// G54 through G59.3
pub const MAX_WORKPLACES: usize = 9;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Axis {
    pub index: usize,
    pub letter: Option<char>,
    pub visible: bool,
    pub homed: bool,
    pub babystep: f32,
    pub user_position: f32,
    pub workplace_offsets: [f32; MAX_WORKPLACES],
    /// Display slot owned by the UI
    pub slot: Option<u8>,
}

impl Axis {
    fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tool {
    pub index: usize,
    pub heater: Option<usize>,
    pub extruder: Option<usize>,
    pub spindle: Option<usize>,
    pub offsets: [f32; MAX_TOTAL_AXES],
    pub status: ToolStatus,
    pub slot: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Spindle {
    pub index: usize,
    pub active: u32,
    pub current: u32,
    pub max: u32,
    pub tool: Option<usize>,
    pub slot: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BedOrChamber {
    pub index: usize,
    pub heater: Option<usize>,
    pub slot: Option<u8>,
}

/// An entity addressed by the controller's integer index
pub trait Indexed {
    fn index(&self) -> usize;
    fn with_index(index: usize) -> Self;
}

macro_rules! impl_indexed {
    ($($ty:ty),*) => {
        $(
            impl Indexed for $ty {
                fn index(&self) -> usize {
                    self.index
                }

                fn with_index(index: usize) -> Self {
                    Self {
                        index,
                        ..Default::default()
                    }
                }
            }
        )*
    };
}

impl_indexed!(Tool, Spindle, BedOrChamber);

/// Vector kept sorted by entity index with no duplicate indices
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IndexedList<T> {
    items: Vec<T>,
}

impl<T> Default for IndexedList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Indexed> IndexedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, index: usize) -> Result<usize, usize> {
        self.items.binary_search_by_key(&index, Indexed::index)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.position(index).ok().map(|pos| &self.items[pos])
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        match self.position(index) {
            Ok(pos) => Some(&mut self.items[pos]),
            Err(_) => None,
        }
    }

    /// Look up `index`, inserting a default entity at its sorted position
    /// if there is none yet.
    pub fn get_or_create(&mut self, index: usize) -> &mut T {
        let pos = match self.position(index) {
            Ok(pos) => pos,
            Err(pos) => {
                self.items.insert(pos, T::with_index(index));
                pos
            }
        };
        &mut self.items[pos]
    }

    /// Remove the entity at `index`, or with `all_following` every entity
    /// whose index is `index` or greater. Returns how many were removed.
    pub fn remove(&mut self, index: usize, all_following: bool) -> usize {
        if all_following {
            let start = self.position(index).unwrap_or_else(|pos| pos);
            let removed = self.items.len() - start;
            self.items.truncate(start);
            removed
        } else {
            match self.position(index) {
                Ok(pos) => {
                    self.items.remove(pos);
                    1
                }
                Err(_) => 0,
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Indices currently present, in ascending order
    pub fn indices(&self) -> Vec<usize> {
        self.items.iter().map(Indexed::index).collect()
    }
}

impl<'a, T> IntoIterator for &'a IndexedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Everything the panel knows about the machine's configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectModelStore {
    axes: [Axis; MAX_TOTAL_AXES],
    pub tools: IndexedList<Tool>,
    pub spindles: IndexedList<Spindle>,
    pub beds: IndexedList<BedOrChamber>,
    pub chambers: IndexedList<BedOrChamber>,
}

impl Default for ObjectModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectModelStore {
    pub fn new() -> Self {
        Self {
            axes: std::array::from_fn(Axis::new),
            tools: IndexedList::new(),
            spindles: IndexedList::new(),
            beds: IndexedList::new(),
            chambers: IndexedList::new(),
        }
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn axis(&self, index: usize) -> Option<&Axis> {
        self.axes.get(index)
    }

    /// `None` for indices past [`MAX_TOTAL_AXES`]
    pub fn axis_mut(&mut self, index: usize) -> Option<&mut Axis> {
        self.axes.get_mut(index)
    }

    /// Reset every axis at or beyond `count` to its default invisible state
    pub fn trim_axes(&mut self, count: usize) {
        for axis in self.axes.iter_mut().skip(count) {
            *axis = Axis::new(axis.index);
        }
    }

    pub fn visible_axis_count(&self) -> usize {
        self.axes.iter().filter(|a| a.visible).count()
    }

    /// True when every visible axis reports homed. False if none are visible.
    pub fn all_axes_homed(&self) -> bool {
        let mut visible = self.axes.iter().filter(|a| a.visible).peekable();
        visible.peek().is_some() && visible.all(|a| a.homed)
    }

    /// Link a spindle to a tool, or unlink it with `None`.
    ///
    /// Afterwards the spindle's tool and that tool's spindle agree, and no
    /// other tool still points at the spindle.
    pub fn set_spindle_tool(&mut self, spindle: usize, tool: Option<usize>) {
        self.spindles.get_or_create(spindle).tool = tool;
        for other in self.tools.iter_mut() {
            if other.spindle == Some(spindle) && Some(other.index) != tool {
                other.spindle = None;
            }
        }
        if let Some(tool) = tool {
            self.tools.get_or_create(tool).spindle = Some(spindle);
        }
    }

    /// Remove tools as [`IndexedList::remove`] does and unlink any spindle
    /// that was driving one of them.
    pub fn remove_tools(&mut self, index: usize, all_following: bool) -> usize {
        let removed = self.tools.remove(index, all_following);
        if removed > 0 {
            for spindle in self.spindles.iter_mut() {
                if spindle.tool.is_some_and(|t| in_removed_range(t, index, all_following)) {
                    spindle.tool = None;
                }
            }
        }
        removed
    }

    /// Remove spindles as [`IndexedList::remove`] does and clear the
    /// back-reference on any tool that used one of them.
    pub fn remove_spindles(&mut self, index: usize, all_following: bool) -> usize {
        let removed = self.spindles.remove(index, all_following);
        if removed > 0 {
            for tool in self.tools.iter_mut() {
                if tool.spindle.is_some_and(|s| in_removed_range(s, index, all_following)) {
                    tool.spindle = None;
                }
            }
        }
        removed
    }

    pub fn tool_for_heater(&self, heater: usize) -> Option<&Tool> {
        self.tools.iter().find(|t| t.heater == Some(heater))
    }

    pub fn tool_for_extruder(&self, extruder: usize) -> Option<&Tool> {
        self.tools.iter().find(|t| t.extruder == Some(extruder))
    }

    pub fn bed_for_heater(&self, heater: usize) -> Option<&BedOrChamber> {
        self.beds.iter().find(|b| b.heater == Some(heater))
    }

    pub fn chamber_for_heater(&self, heater: usize) -> Option<&BedOrChamber> {
        self.chambers.iter().find(|c| c.heater == Some(heater))
    }

    /// A heater is worth reporting only if a tool, bed or chamber uses it
    pub fn heater_is_referenced(&self, heater: usize) -> bool {
        self.tool_for_heater(heater).is_some()
            || self.bed_for_heater(heater).is_some()
            || self.chamber_for_heater(heater).is_some()
    }

    pub fn reset_beds_and_chambers(&mut self) {
        self.beds.clear();
        self.chambers.clear();
    }

    pub fn clear(&mut self) {
        self.trim_axes(0);
        self.tools.clear();
        self.spindles.clear();
        self.reset_beds_and_chambers();
    }
}

fn in_removed_range(candidate: usize, index: usize, all_following: bool) -> bool {
    if all_following {
        candidate >= index
    } else {
        candidate == index
    }
}
