pub mod optimizely;
