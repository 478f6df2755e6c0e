pub mod base_model;
pub mod dbscan;
pub mod kmeans;
pub mod oif;
pub mod oif_tree;
