mod fem;
