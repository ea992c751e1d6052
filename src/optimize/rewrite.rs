//! Index-addressed edits applied as a single functional rewrite
//!
//! Passes never mutate the instruction vector they are scanning. They
//! record edits against indices of the current vector and build the next
//! vector in one go, so no index is invalidated while an edit set is
//! being assembled.
//!
//! Author: Moroya Sakamoto

use crate::machine::Instruction;

#[derive(Debug, Clone)]
enum Edit {
    Replace(Vec<Instruction>),
    Remove,
    InsertBefore(Vec<Instruction>),
    InsertAfter(Vec<Instruction>),
}

/// Set of edits against one instruction vector
#[derive(Debug, Clone, Default)]
pub struct Rewrite {
    edits: Vec<(usize, Edit)>,
}

impl Rewrite {
    /// Empty edit set
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the instruction at `index` with `with` (one or more instructions)
    pub fn replace(
        &mut self,
        index: usize,
        with: impl IntoIterator<Item = Instruction>,
    ) -> &mut Self {
        self.edits
            .push((index, Edit::Replace(with.into_iter().collect())));
        self
    }

    /// Delete the instruction at `index`
    pub fn remove(&mut self, index: usize) -> &mut Self {
        self.edits.push((index, Edit::Remove));
        self
    }

    /// Insert instructions immediately before `index`
    pub fn insert_before(
        &mut self,
        index: usize,
        insts: impl IntoIterator<Item = Instruction>,
    ) -> &mut Self {
        self.edits
            .push((index, Edit::InsertBefore(insts.into_iter().collect())));
        self
    }

    /// Insert instructions immediately after `index`
    pub fn insert_after(
        &mut self,
        index: usize,
        insts: impl IntoIterator<Item = Instruction>,
    ) -> &mut Self {
        self.edits
            .push((index, Edit::InsertAfter(insts.into_iter().collect())));
        self
    }

    /// Returns true if no edits were recorded
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Build the rewritten vector
    ///
    /// Insertions at the same index keep their recording order. A replace
    /// or remove takes effect once; the last one recorded for an index wins.
    pub fn apply(self, insts: &[Instruction]) -> Vec<Instruction> {
        let mut before: Vec<Vec<Instruction>> = vec![Vec::new(); insts.len()];
        let mut after: Vec<Vec<Instruction>> = vec![Vec::new(); insts.len()];
        let mut body: Vec<Option<Vec<Instruction>>> = vec![None; insts.len()];

        for (index, edit) in self.edits {
            if index >= insts.len() {
                continue;
            }
            match edit {
                Edit::Replace(with) => body[index] = Some(with),
                Edit::Remove => body[index] = Some(Vec::new()),
                Edit::InsertBefore(v) => before[index].extend(v),
                Edit::InsertAfter(v) => after[index].extend(v),
            }
        }

        let mut out = Vec::with_capacity(insts.len());
        for (i, inst) in insts.iter().enumerate() {
            out.append(&mut before[i]);
            match body[i].take() {
                Some(with) => out.extend(with),
                None => out.push(inst.clone()),
            }
            out.append(&mut after[i]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_edits() {
        let insts = vec![
            Instruction::WriteOutput(0),
            Instruction::WriteOutput(1),
            Instruction::WriteOutput(2),
        ];
        let mut rw = Rewrite::new();
        rw.remove(0)
            .insert_before(1, [Instruction::Push])
            .insert_after(1, [Instruction::Pop(1)])
            .replace(2, [Instruction::WriteOutput(7), Instruction::WriteOutput(8)]);
        assert_eq!(
            rw.apply(&insts),
            vec![
                Instruction::Push,
                Instruction::WriteOutput(1),
                Instruction::Pop(1),
                Instruction::WriteOutput(7),
                Instruction::WriteOutput(8),
            ]
        );
    }

    #[test]
    fn test_empty_rewrite_is_identity() {
        let insts = vec![Instruction::Push, Instruction::Pop(1)];
        let rw = Rewrite::new();
        assert!(rw.is_empty());
        assert_eq!(rw.apply(&insts), insts);
    }
}
