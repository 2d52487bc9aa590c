/*
    Grammar-driven derivations: compile a BNF rule set, sample strings from it
    with an exact budget of primitive units, and mutate existing strings one
    subtree at a time
*/

pub mod compiler;
pub mod derivation;
pub mod error_handling;
pub mod generator;
pub mod grammar;
pub mod mutation;
pub mod parser;

pub use compiler::Compiler;
pub use derivation::{DerivationNode, DerivationTree, NodeId, SyntaxError};
pub use generator::{Sample, SampleError, SampleRequest, Sampler};
pub use grammar::{Cost, GrammarModel, ModelConfig, ModelError, Symbol};
pub use mutation::{Edit, EditError, MutateError, Mutation, MutationEngine};
