//! Training-set extraction

mod stratified;

pub use stratified::{stratified_sample, validity_class, SampleSet, StratifiedParams, TrainingSample};
