use crate::derivation::DerivationTree;

// Turns a complete derivation into a domain value, such as a program or a
// rendered scene. Nothing in this crate calls it; it is the seam between
// sampled or mutated strings and whatever consumes them.
pub trait Compiler {
    type Output;
    type Error;

    fn compile(&self, tree: &DerivationTree) -> Result<Self::Output, Self::Error>;
}
