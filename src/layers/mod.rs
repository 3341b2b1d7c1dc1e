mod conv_pool;

pub use self::conv_pool::{ConvPoolLayer, ForwardPass};
