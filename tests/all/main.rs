mod capacity;
mod maintenance;
