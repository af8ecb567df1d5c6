pub mod features;
pub mod softmax;

pub use features::FeatureExtractor;
pub use softmax::{
    batch_size_for, softmax, train, ClassifierModel, SoftmaxClassifier, TrainingReport,
    TrainingSample,
};
