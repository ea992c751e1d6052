//! Redundant push/pop removal
//!
//! Author: Moroya Sakamoto

use super::rewrite::Rewrite;
use super::scan::skip_until_pop;
use crate::machine::Instruction;

/// Collapse consecutive pops, then drop pushes whose branch is redundant
///
/// A push is redundant when nothing at its own level modifies the frame
/// before the closing pop, when the closing pop also closes an enclosing
/// branch, or when the closing pop is the last instruction. Removing it
/// decrements the matching pop, deleting the pop once its count reaches
/// zero.
pub fn remove_redundant_pushes(insts: Vec<Instruction>) -> Vec<Instruction> {
    let mut insts = coalesce_pops(insts);

    let mut i = 0;
    while i < insts.len() {
        if insts[i] == Instruction::Push {
            let (redundant, pop) = is_redundant_push(&insts, i);
            if redundant {
                let mut rw = Rewrite::new();
                rw.remove(i);
                if let Some(p) = pop {
                    match insts[p] {
                        Instruction::Pop(n) if n > 1 => {
                            rw.replace(p, [Instruction::Pop(n - 1)]);
                        }
                        _ => {
                            rw.remove(p);
                        }
                    }
                }
                insts = rw.apply(&insts);
                continue;
            }
        }
        i += 1;
    }
    insts
}

/// Merge adjacent `Pop(a), Pop(b)` into `Pop(a + b)` and drop `Pop(0)`
pub fn coalesce_pops(insts: Vec<Instruction>) -> Vec<Instruction> {
    let mut out: Vec<Instruction> = Vec::with_capacity(insts.len());
    for inst in insts {
        if inst == Instruction::Pop(0) {
            continue;
        }
        if let (Some(Instruction::Pop(prev)), Instruction::Pop(n)) = (out.last_mut(), &inst) {
            *prev += *n;
            continue;
        }
        out.push(inst);
    }
    out
}

/// Returns whether the push at `index` is redundant and the index of the
/// pop that closes it, if any
fn is_redundant_push(insts: &[Instruction], index: usize) -> (bool, Option<usize>) {
    let mut found_transform = false;
    let mut i = index + 1;

    while i < insts.len() {
        match &insts[i] {
            Instruction::Push => {
                let (next, extra) = skip_until_pop(insts, i + 1);
                if extra > 0 {
                    let redundant = extra > 1 || !found_transform || next == insts.len();
                    return (redundant, Some(next - 1));
                }
                i = next;
                continue;
            }
            Instruction::Pop(0) => {}
            Instruction::Pop(n) => {
                let redundant = *n > 1 || !found_transform || i + 1 == insts.len();
                return (redundant, Some(i));
            }
            inst if inst.modifies_frame() => found_transform = true,
            _ => {}
        }
        i += 1;
    }
    (true, None)
}
